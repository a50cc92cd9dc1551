//! Terminal output for humans.
//!
//! Status lines go to stderr so that `--json` keeps stdout machine-readable.

use std::io::{self, Write};

use cyrup_termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Writes colored, prefixed status lines.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    /// Creates a manager.
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    fn line(&self, spec: Option<ColorSpec>, prefix: &str, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stream = StandardStream::stderr(ColorChoice::Auto);
        write_line(&mut stream, spec.as_ref(), prefix, message)
    }

    /// Prints only in verbose mode.
    pub fn verbose(&self, message: &str) -> io::Result<()> {
        if self.verbose {
            self.line(Some(dimmed()), "  ", message)?;
        }
        Ok(())
    }

    /// Successful step.
    pub fn success(&self, message: &str) -> io::Result<()> {
        self.line(Some(colored(Color::Green)), "✓ ", message)
    }

    /// Recoverable problem.
    pub fn warn(&self, message: &str) -> io::Result<()> {
        self.line(Some(colored(Color::Yellow)), "⚠ ", message)
    }

    /// Failed step. Printed even in quiet mode.
    pub fn error(&self, message: &str) -> io::Result<()> {
        let mut stream = StandardStream::stderr(ColorChoice::Auto);
        write_line(&mut stream, Some(&colored(Color::Red)), "✗ ", message)
    }

    /// Step in progress.
    pub fn progress(&self, message: &str) -> io::Result<()> {
        self.line(Some(colored(Color::Cyan)), "→ ", message)
    }

    /// Section header.
    pub fn section(&self, title: &str) -> io::Result<()> {
        let mut bold = ColorSpec::new();
        bold.set_bold(true);
        self.line(Some(bold), "\n", title)?;
        self.line(None, "", &"─".repeat(title.chars().count()))
    }

    /// Indented detail line.
    pub fn indent(&self, message: &str) -> io::Result<()> {
        self.line(None, "    ", message)
    }

    /// Writes `text` without a trailing newline and flushes, for prompts.
    pub fn prompt(&self, text: &str) -> io::Result<()> {
        let mut stream = StandardStream::stderr(ColorChoice::Auto);
        stream.set_color(ColorSpec::new().set_bold(true))?;
        write!(stream, "{text}")?;
        stream.reset()?;
        stream.flush()
    }
}

fn colored(color: Color) -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color)).set_bold(true);
    spec
}

fn dimmed() -> ColorSpec {
    let mut spec = ColorSpec::new();
    spec.set_dimmed(true);
    spec
}

/// Colors only the prefix; the message stays plain so it can be copied.
fn write_line<W: WriteColor>(
    out: &mut W,
    spec: Option<&ColorSpec>,
    prefix: &str,
    message: &str,
) -> io::Result<()> {
    match spec {
        Some(spec) => {
            out.set_color(spec)?;
            write!(out, "{prefix}")?;
            if prefix.trim().is_empty() {
                write!(out, "{message}")?;
                out.reset()?;
            } else {
                out.reset()?;
                write!(out, "{message}")?;
            }
        }
        None => write!(out, "{prefix}{message}")?,
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyrup_termcolor::Buffer;

    #[test]
    fn status_prefix_is_colored_on_ansi_terminals() {
        let mut buf = Buffer::ansi();
        write_line(&mut buf, Some(&colored(Color::Red)), "✗ ", "upload failed").unwrap();
        let text = String::from_utf8(buf.into_inner()).unwrap();
        assert!(text.starts_with("\u{1b}["));
        assert!(text.contains("✗ "));
        assert!(text.ends_with("upload failed\n"));
    }

    #[test]
    fn no_color_buffer_writes_plain_lines() {
        let mut buf = Buffer::no_color();
        write_line(&mut buf, Some(&colored(Color::Green)), "✓ ", "done").unwrap();
        assert_eq!(String::from_utf8(buf.into_inner()).unwrap(), "✓ done\n");
    }
}
