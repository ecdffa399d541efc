use chrono::{DateTime, Local, Utc};
use colored::Colorize;
use shipdeck_common::ProgressEvent;

/// Terminal output styling
pub struct Styles;

impl Styles {
    /// Print a section header
    pub fn header(text: &str) {
        println!();
        println!("{}", text.bright_white().bold());
        println!("{}", "─".repeat(40).dimmed());
    }

    /// Print a success message
    pub fn success(text: &str) {
        println!("{} {}", "[ok]".bright_green(), text);
    }

    /// Print an error message
    pub fn error(text: &str) {
        println!("{} {}", "[error]".bright_red(), text);
    }

    /// Print a warning message
    pub fn warning(text: &str) {
        println!("{} {}", "[warn]".bright_yellow(), text);
    }

    /// Print an info message
    pub fn info(text: &str) {
        println!("{} {}", "->".dimmed(), text);
    }

    /// Print a dimmed/secondary message
    pub fn dimmed(text: &str) {
        println!("   {}", text.dimmed());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!(
            "   {:<18} {}",
            format!("{}:", key).dimmed(),
            value.bright_white()
        );
    }

    /// Print a status line with label
    pub fn status(label: &str, value: &str, color: StatusColor) {
        let colored_value = match color {
            StatusColor::Green => value.bright_green(),
            StatusColor::Yellow => value.bright_yellow(),
            StatusColor::Red => value.bright_red(),
            StatusColor::White => value.bright_white(),
        };
        println!("   {:<14} {}", format!("{}:", label).dimmed(), colored_value);
    }

    /// Print one streamed deployment event as a log line
    pub fn event(received_at: DateTime<Utc>, event: &ProgressEvent) {
        let time = received_at.with_timezone(&Local).format("%H:%M:%S").to_string();
        let line = match event {
            ProgressEvent::Log { message } => message.normal(),
            ProgressEvent::Success { message } => message.bright_green(),
            ProgressEvent::Error { message } => message.bright_red(),
            ProgressEvent::Done(_) => return,
        };
        println!("{} {}", time.dimmed(), line);
    }

    /// Color for a deployment status string from the server
    pub fn status_color(status: &str) -> StatusColor {
        match status {
            "active" | "running" | "healthy" | "success" => StatusColor::Green,
            "deploying" | "queued" | "building" | "pending" | "restarting" => StatusColor::Yellow,
            "failed" | "error" | "stopped" | "unhealthy" => StatusColor::Red,
            _ => StatusColor::White,
        }
    }

    /// Format bytes to human readable
    pub fn format_bytes(bytes: u64) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if bytes >= GB {
            format!("{:.2} GB", bytes as f64 / GB as f64)
        } else if bytes >= MB {
            format!("{:.2} MB", bytes as f64 / MB as f64)
        } else if bytes >= KB {
            format!("{:.2} KB", bytes as f64 / KB as f64)
        } else {
            format!("{} B", bytes)
        }
    }
}

pub enum StatusColor {
    Green,
    Yellow,
    Red,
    White,
}
