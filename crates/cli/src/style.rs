//! Terminal styling for rosterbulk output.

use console::Style;

use rosterbulk_core::models::Status;
use rosterbulk_core::Response;

fn marked(mark: &str, style: Style, msg: &str) -> String {
    format!("{} {}", style.apply_to(mark), msg)
}

/// Green check mark line.
pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

/// Red cross line.
pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

/// Yellow warning line.
pub fn warn(msg: &str) -> String {
    marked("⚠", Style::new().yellow(), msg)
}

/// Bold section title.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// One line for a core [`Response`], marked by its status.
pub fn response(res: &Response) -> String {
    match res.status {
        Status::Success => success(&res.message),
        Status::Warning => warn(&res.message),
        Status::Error => error(&res.message),
    }
}
