//! Selectors for the Report a Problem purchase list.
//!
//! The portal marks its controls with `data-auto-test-id` attributes, which
//! have been far more stable than its class names.
//!
//! **Update process**: when scanning stops finding rows, open the portal
//! with devtools, look up the new test ids, update them here and extend the
//! container fixtures in the parser tests.

use scraper::Selector;
use std::sync::LazyLock;

/// CSS selectors evaluated in the live page.
pub mod dom {
    /// Disclosure button heading one purchase in the list.
    pub const ROW_TOGGLE: &str =
        r#"button[data-auto-test-id="RAP2.PurchaseList.PurchaseHeader.Button.ToggleDisclosure"]"#;

    /// Shown inside expanded details when no receipt exists.
    pub const NO_INVOICE: &str =
        r#"div[data-auto-test-id="RAP2.PurchaseList.PurchaseDetails.Label.NoInvoice"]"#;

    /// Opens the receipt of the expanded purchase.
    pub const VIEW_RECEIPT: &str =
        r#"button[data-auto-test-id="RAP2.PurchaseList.PurchaseDetails.Button.ViewReceipt"]"#;

    /// Family-sharing member filter.
    pub const FAMILY_MEMBER: &str =
        r#"select[data-auto-test-id="RAP2.FilterPurchases.Select.FamilyMember"]"#;

    /// Top-level container of one purchase (header plus line items).
    pub const PURCHASE: &str = ".purchase";
}

/// Selectors applied to the HTML of a single purchase container.
pub mod container {
    use super::*;

    /// The container's own disclosure button.
    pub static TOGGLE: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(
            "button[data-auto-test-id='RAP2.PurchaseList.PurchaseHeader.Button.ToggleDisclosure']",
        )
        .unwrap()
    });

    /// Product titles of the line items.
    pub static PRODUCT_TITLE: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse(".pli-title div[aria-label]").unwrap());
}
