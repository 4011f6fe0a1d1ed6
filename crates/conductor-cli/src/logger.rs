use colored::{Color, Colorize};
use conductor_types::{LogLevel, ServiceInfo, ServiceStatus, SetupProgress, SetupStatus};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{self, Stdout, Write};

pub struct Logger<W: Write = Stdout> {
    output: W,
}

impl<W: Write> Logger<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    fn string_to_color(s: &str) -> Color {
        let colors = [
            Color::Green,
            Color::Blue,
            Color::Magenta,
            Color::Cyan,
            Color::BrightGreen,
            Color::BrightBlue,
            Color::BrightMagenta,
            Color::BrightCyan,
        ];

        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        let hash = hasher.finish();

        let idx = usize::try_from(hash % colors.len() as u64).unwrap_or_default();
        colors[idx]
    }

    fn status_color(status: ServiceStatus) -> Color {
        match status {
            ServiceStatus::Running => Color::Green,
            ServiceStatus::Starting | ServiceStatus::Installing => Color::Yellow,
            ServiceStatus::Failed | ServiceStatus::InstallationFailed => Color::Red,
            _ => Color::White,
        }
    }

    pub fn log(&mut self, service_name: &str, level: LogLevel, message: &str) {
        let prefix = format!("[{service_name}]").color(Self::string_to_color(service_name));
        for line in message.lines() {
            let _ = match level {
                LogLevel::Error => writeln!(self.output, "{prefix} {}", line.red()),
                LogLevel::Warn => writeln!(self.output, "{prefix} {}", line.yellow()),
                LogLevel::Info => writeln!(self.output, "{prefix} {line}"),
            };
        }
    }

    pub fn system(&mut self, message: &str) {
        let prefix = "[system]".color(Color::Red);
        for line in message.lines() {
            let _ = writeln!(self.output, "{prefix} {line}");
        }
    }

    pub fn progress(&mut self, event: &SetupProgress) {
        let prefix =
            format!("[{}]", event.service_name).color(Self::string_to_color(&event.service_name));
        let step = match event.status {
            SetupStatus::Executing => event.step.normal(),
            SetupStatus::Success => event.step.green(),
            SetupStatus::Failed => event.step.red(),
        };
        let _ = writeln!(self.output, "{prefix} {step}: {}", event.debug_message);
    }

    pub fn status(&mut self, info: &ServiceInfo) {
        let prefix = format!("[{}]", info.name).color(Self::string_to_color(&info.name));
        let status = info.status.as_str().color(Self::status_color(info.status));
        let _ = writeln!(self.output, "{prefix} {status} {}", info.base_url);
    }
}

impl Logger {
    pub fn default() -> Self {
        Self::new(io::stdout())
    }
}
