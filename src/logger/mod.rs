use std::sync::atomic::{AtomicBool, Ordering};

use colored::*;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

pub struct Logger {
    show_debug: AtomicBool,
    show_info: AtomicBool,
    show_warning: AtomicBool,
    show_error: AtomicBool,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            show_debug: AtomicBool::new(false),
            show_info: AtomicBool::new(true),
            show_warning: AtomicBool::new(true),
            show_error: AtomicBool::new(true),
        }
    }

    pub fn set_level(&self, level: LogLevel, enabled: bool) {
        let flag = match level {
            LogLevel::Debug => &self.show_debug,
            LogLevel::Info => &self.show_info,
            LogLevel::Warning => &self.show_warning,
            LogLevel::Error => &self.show_error,
        };
        flag.store(enabled, Ordering::Relaxed);
    }

    fn enabled(&self, level: LogLevel) -> bool {
        match level {
            LogLevel::Debug => self.show_debug.load(Ordering::Relaxed),
            LogLevel::Info => self.show_info.load(Ordering::Relaxed),
            LogLevel::Warning => self.show_warning.load(Ordering::Relaxed),
            LogLevel::Error => self.show_error.load(Ordering::Relaxed),
        }
    }

    pub fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            println!("{}", format!("[DEBUG] {}", message).blue().bold());
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            println!("{}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.enabled(LogLevel::Warning) {
            println!("{}", format!("[WARNING] {}", message).yellow().bold());
        }
    }

    pub fn error(&self, message: &str) {
        if self.enabled(LogLevel::Error) {
            println!("{}", format!("[ERROR] {}", message).red().bold());
        }
    }

    pub fn session(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            println!("{}", format!("[SESSION] {}", message).cyan());
        }
    }

    pub fn shard(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            println!("{}", format!("[SHARD] {}", message).magenta());
        }
    }

    pub fn host(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            println!("{}", format!("[HOST] {}", message).green());
        }
    }

    pub fn payment(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            println!("{}", format!("[PAYMENT] {}", message).bright_yellow());
        }
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref LOGGER: Logger = Logger::new();
}
