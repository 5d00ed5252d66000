use std::io::{self, Write};

use color_print::cformat;

/// Transient one-line notifications printed under the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Success,
    Error,
    Info,
}

impl Notice {
    pub fn write(self, output: &mut dyn Write, message: &str) -> io::Result<()> {
        let line = match self {
            Notice::Success => cformat!("<green><bold>✔</bold></green> {}", message),
            Notice::Error => cformat!("<red><bold>✖</bold></red> {}", message),
            Notice::Info => cformat!("<cyan>›</cyan> {}", message),
        };
        writeln!(output, "{}", line)
    }
}
