//! Environment report for `--info` and `--debug`

use std::fmt::Write as _;

use nu_ansi_term::{Color, Style};
use sg_core::{EngineReport, EngineStatus};

/// Setup advice for an engine that failed its probe
fn setup_hint(engine: &str) -> Option<&'static str> {
    match engine {
        "say" => Some("say: built into macOS; not available on this platform"),
        "espeak" => Some("espeak: apt-get install espeak-ng (Linux) or brew install espeak (macOS); set ESPEAK_BINARY for a custom path"),
        "gtts" => Some("gtts: needs internet access to translate.google.com"),
        "azure" => Some("azure: set AZURE_SPEECH_KEY and AZURE_SPEECH_REGION"),
        "openai" => Some("openai: set OPENAI_API_KEY"),
        _ => None,
    }
}

struct Painter {
    color: bool,
}

impl Painter {
    fn paint(&self, style: Style, text: &str) -> String {
        if self.color {
            style.paint(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint(Color::Cyan.bold(), text)
    }

    fn engine_line(&self, engine: &EngineStatus) -> String {
        let mark = if engine.healthy {
            self.paint(Color::Green.normal(), "ok  ")
        } else {
            self.paint(Color::Red.normal(), "down")
        };
        let mut line = format!(
            "  [{}] {:<8} {} (quality: {}, ~{}ms, {} languages, {} voices)",
            mark,
            engine.id,
            engine.description,
            engine.quality,
            engine.typical_latency_ms,
            engine.languages.len(),
            engine.voice_count
        );
        if let Some(reason) = &engine.reason {
            line.push_str(&self.paint(Style::new().dimmed(), &format!(" - {}", reason)));
        }
        line
    }
}

/// Render the report as terminal text
pub fn render(report: &EngineReport, color: bool) -> String {
    let painter = Painter { color };
    let mut out = String::new();

    let _ = writeln!(out, "{}", painter.heading("speech-gateway environment"));
    let _ = writeln!(
        out,
        "  platform: {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    let _ = writeln!(out);

    let sections = [
        ("Offline engines", true),
        ("Online services", false),
    ];
    for (title, offline) in sections {
        let _ = writeln!(out, "{}", painter.heading(title));
        let engines: Vec<&EngineStatus> = report.engines.iter().filter(|e| e.is_offline == offline).collect();
        if engines.is_empty() {
            let _ = writeln!(out, "  (none registered)");
        }
        for engine in engines {
            let _ = writeln!(out, "{}", painter.engine_line(engine));
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "{}", painter.heading("Summary"));
    let _ = writeln!(
        out,
        "  {} engines ({} offline, {} online), {} healthy",
        report.total, report.offline, report.online, report.healthy
    );
    let recommended = report
        .recommended
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string());
    let _ = writeln!(out, "  recommended engine: {}", recommended);
    let _ = writeln!(out, "  default language: {}", report.default_language);
    let _ = writeln!(out, "  probed at: {}", report.probed_at.to_rfc3339());

    let hints: Vec<&str> = report
        .engines
        .iter()
        .filter(|e| !e.healthy)
        .filter_map(|e| setup_hint(e.id.as_str()))
        .collect();
    if !hints.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", painter.heading("Setup hints"));
        for hint in hints {
            let _ = writeln!(out, "  - {}", hint);
        }
    }
    out
}
