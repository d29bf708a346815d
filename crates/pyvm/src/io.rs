use std::borrow::Cow;

/// Trait for handling output produced by the interpreted program.
///
/// Receives everything the `print()` builtin and the `PRINT_EXPR` opcode emit, so hosts
/// and tests can capture or redirect it. The default implementation `StdPrint` writes
/// to stdout.
pub trait PrintWriter {
    /// Called once for each formatted value.
    ///
    /// Must not add separators or a trailing newline; those arrive through
    /// [`stdout_push`](PrintWriter::stdout_push).
    fn stdout_write(&mut self, output: Cow<'_, str>);

    /// Add a single character to stdout, generally a space or a newline.
    fn stdout_push(&mut self, end: char);
}

/// Default `PrintWriter` that writes to stdout.
#[derive(Debug, Default)]
pub struct StdPrint;

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) {
        print!("{output}");
    }

    fn stdout_push(&mut self, end: char) {
        print!("{end}");
    }
}

/// A `PrintWriter` that collects all output into a string.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the output collected so far and starts over with an empty buffer.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.0)
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) {
        self.0.push_str(&output);
    }

    fn stdout_push(&mut self, end: char) {
        self.0.push(end);
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) {}

    fn stdout_push(&mut self, _end: char) {}
}

impl<W: PrintWriter + ?Sized> PrintWriter for &mut W {
    fn stdout_write(&mut self, output: Cow<'_, str>) {
        (**self).stdout_write(output);
    }

    fn stdout_push(&mut self, end: char) {
        (**self).stdout_push(end);
    }
}
