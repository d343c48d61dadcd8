//! Browser automation over the Chrome DevTools Protocol.

pub mod cdp;
pub mod driver;
pub mod error;
pub mod launcher;
pub mod page;

pub use driver::{CdpPage, PageOptions};
pub use error::BrowserError;
pub use launcher::BrowserSession;
pub use page::{BrowserPage, NetworkResponse};
