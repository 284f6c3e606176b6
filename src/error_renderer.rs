//! Error rendering using ariadne
//!
//! Errors that carry a span are rendered against the program source with the
//! offending range labelled. Without a source or span (for example, a fault
//! in a chunk loaded from an artifact) a plain summary is written instead.

use std::io::Write;

use ariadne::{Color, Label, Report, ReportKind, Source};
use dem_core::errors::{Error, ErrorKind};

const SOURCE_NAME: &str = "<program>";

/// Render an error to stderr
///
/// # Example
/// ```no_run
/// use dem::{Engine, EngineOptions, render_error};
/// use dem::ast::{Node, Operator, Span};
/// use bumpalo::Bump;
///
/// let arena = Bump::new();
/// let engine = Engine::new(&arena, EngineOptions::default());
///
/// let source = "1 + true";
/// let program = Node::binary(Operator::Add, Node::int(1), Node::bool(true))
///     .with_span(Span::new(0, 8));
/// if let Err(e) = engine.compile(&program) {
///     render_error(&e, Some(source));
/// }
/// ```
pub fn render_error(error: &Error, source: Option<&str>) {
    render_error_to_writer(error, source, &mut std::io::stderr(), true).ok();
}

/// Render an error to a specific writer
pub fn render_error_to(
    error: &Error,
    source: Option<&str>,
    writer: &mut dyn Write,
) -> std::io::Result<()> {
    render_error_to_writer(error, source, writer, true)
}

/// Render an error to a String (useful for logs, UIs, etc.)
pub fn render_error_to_string(error: &Error, source: Option<&str>) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, true).ok();
    String::from_utf8_lossy(&buf).to_string()
}

/// Render an error to a String without color codes (useful for tests)
pub fn render_error_to_string_no_color(error: &Error, source: Option<&str>) -> String {
    let mut buf = Vec::new();
    render_error_to_writer(error, source, &mut buf, false).ok();
    String::from_utf8_lossy(&buf).to_string()
}

fn render_error_to_writer(
    error: &Error,
    source: Option<&str>,
    writer: &mut dyn Write,
    use_color: bool,
) -> std::io::Result<()> {
    let (Some(source), Some(span)) = (source, error.span.as_ref()) else {
        return render_plain(error, writer);
    };
    // A span from some other source cannot be labelled.
    if span.start() > span.end() || span.end() > source.len() {
        return render_plain(error, writer);
    }
    let range = span.start()..span.end();

    let kind = match error.kind {
        ErrorKind::Internal(_) => ReportKind::Custom("internal", Color::Magenta),
        _ => ReportKind::Error,
    };
    let headline = format!("{} ({})", error.kind, error.stage);
    let label = error.details.first().cloned().unwrap_or_else(|| error.kind.to_string());

    let mut report = Report::build(kind, (SOURCE_NAME, range.clone()))
        .with_code(error.kind.name())
        .with_message(headline)
        .with_config(ariadne::Config::default().with_color(use_color))
        .with_label(
            Label::new((SOURCE_NAME, range))
                .with_message(label)
                .with_color(Color::Red),
        );

    // Extra details as notes
    for detail in error.details.iter().skip(1) {
        report = report.with_note(detail);
    }

    report
        .finish()
        .write((SOURCE_NAME, Source::from(source)), &mut *writer)
}

fn render_plain(error: &Error, writer: &mut dyn Write) -> std::io::Result<()> {
    write!(writer, "error[{}]: {} ({})", error.kind.name(), error.kind, error.stage)?;
    if let Some(span) = &error.span {
        write!(writer, " at {}..{}", span.start(), span.end())?;
    }
    writeln!(writer)?;
    for detail in &error.details {
        writeln!(writer, "  {detail}")?;
    }
    Ok(())
}
