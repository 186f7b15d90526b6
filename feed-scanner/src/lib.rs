mod page;
mod scanner;
mod selectors;

pub use page::*;
pub use scanner::*;
pub use selectors::*;

pub use scraper::Html;
