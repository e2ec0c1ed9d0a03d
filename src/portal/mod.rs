//! Report a Problem portal: browser driver, list parsing and the two passes.

pub mod chromium;
pub mod models;
pub mod page;
pub mod parser;
pub mod retriever;
pub mod scanner;
pub mod selectors;
pub mod session;

pub use chromium::ChromiumPage;
pub use models::{PurchaseRecord, RowSummary};
pub use page::PurchasePage;
pub use retriever::{ItemRetriever, RetrievalError, SavedInvoice};
pub use scanner::{ListScanner, LoadOutcome};
pub use session::SessionState;
