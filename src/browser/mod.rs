#[cfg(feature = "chrome")]
pub mod chrome;
pub mod element_monitor;
pub mod page;

#[cfg(feature = "chrome")]
pub use chrome::ChromeBrowser;
pub use element_monitor::ElementMonitor;
pub use page::BrowserPage;
