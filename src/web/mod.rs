pub mod console_page;
pub mod server;

pub use console_page::AppState;
pub use server::WebServer;
