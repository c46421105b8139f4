//! Default header schemas for managed sheets.

/// Header schemas keyed by sheet name.
const DEFAULT_HEADERS: &[(&str, &[&str])] = &[
    (
        "GA4 Properties",
        &["Property ID", "Display Name", "Time Zone", "Currency", "Industry", "Create Time", "Update Time"],
    ),
    (
        "GA4 Data Streams",
        &["Stream ID", "Property ID", "Type", "Display Name", "Measurement ID", "Update Time"],
    ),
    (
        "GA4 Custom Dimensions",
        &["Dimension ID", "Property ID", "Parameter Name", "Display Name", "Scope", "Update Time"],
    ),
    (
        "GTM Tags",
        &["Tag ID", "Container ID", "Name", "Type", "Firing Triggers", "Paused", "Fingerprint"],
    ),
    (
        "GTM Triggers",
        &["Trigger ID", "Container ID", "Name", "Type", "Fingerprint"],
    ),
    (
        "GTM Variables",
        &["Variable ID", "Container ID", "Name", "Type", "Fingerprint"],
    ),
    (
        "Search Console Sites",
        &["Site URL", "Permission Level", "Sitemaps", "Last Checked"],
    ),
    (
        "YouTube Channels",
        &["Channel ID", "Title", "Subscribers", "Videos", "Views", "Published At"],
    ),
    (
        "Ads Campaigns",
        &["Campaign ID", "Customer ID", "Name", "Status", "Channel Type", "Budget", "Last Modified"],
    ),
    (
        "Merchant Center Products",
        &["Offer ID", "Merchant ID", "Title", "Availability", "Price", "Status", "Last Modified"],
    ),
    (
        "BigQuery Datasets",
        &["Dataset ID", "Project ID", "Location", "Tables", "Last Modified"],
    ),
    (
        "AdSense Accounts",
        &["Account ID", "Display Name", "State", "Time Zone", "Create Time"],
    ),
    (
        "Audit Log",
        &["Timestamp", "Service", "Resource Type", "Mode", "Status", "Records"],
    ),
];

/// Look up the default header row for a sheet.
///
/// Matching is case-insensitive on the sheet name.
#[must_use]
pub fn default_headers(sheet_name: &str) -> Option<Vec<String>> {
    DEFAULT_HEADERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(sheet_name.trim()))
        .map(|(_, headers)| headers.iter().map(|h| (*h).to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = default_headers("gtm tags").unwrap();
        assert_eq!(headers[0], "Tag ID");
        assert!(default_headers("Unknown Sheet").is_none());
    }
}
