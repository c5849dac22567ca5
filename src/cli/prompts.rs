//! Interactive questions asked when no country is given on the command line

use std::io::{self, BufRead, Stdin, Stdout, Write};
use tracing::warn;

/// Country asked for when the user just presses enter
pub const DEFAULT_COUNTRY: &str = "Iran";

/// Locality type asked for when the user just presses enter
pub const DEFAULT_LOCALITY_TYPE: &str = "Mine";

/// Page size asked for when the user just presses enter
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Answers collected from the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptAnswers {
    /// Country to download
    pub country: String,
    /// Locality type label
    pub locality_type: String,
    /// Records per page
    pub page_size: u32,
}

/// Source of run inputs; swap in another implementation for a TUI or tests
pub trait Questioner {
    /// Ask for country, locality type and page size
    fn ask(&mut self) -> io::Result<PromptAnswers>;
}

/// Line-based questioner reading answers from `input` and writing prompts to `output`
pub struct StdinQuestioner<R, W> {
    input: R,
    output: W,
}

impl StdinQuestioner<io::StdinLock<'static>, Stdout> {
    /// Questioner bound to the process stdin and stdout
    pub fn stdio() -> Self {
        let stdin: Stdin = io::stdin();
        Self::new(stdin.lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> StdinQuestioner<R, W> {
    /// Create a questioner over arbitrary streams
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn question(&mut self, label: &str, default: &str) -> io::Result<String> {
        write!(self.output, "{label} [{default}]: ")?;
        self.output.flush()?;

        let mut line = String::new();
        self.input.read_line(&mut line)?;
        let answer = line.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }
}

impl<R: BufRead, W: Write> Questioner for StdinQuestioner<R, W> {
    fn ask(&mut self) -> io::Result<PromptAnswers> {
        let country = self.question("Country", DEFAULT_COUNTRY)?;
        let locality_type = self.question("Locality type", DEFAULT_LOCALITY_TYPE)?;
        let page_size_text = self.question("Page size", &DEFAULT_PAGE_SIZE.to_string())?;
        let page_size = parse_page_size(&page_size_text);

        Ok(PromptAnswers {
            country,
            locality_type,
            page_size,
        })
    }
}

fn parse_page_size(text: &str) -> u32 {
    match text.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => {
            warn!(value = text, default = DEFAULT_PAGE_SIZE, "Invalid page size, using default");
            DEFAULT_PAGE_SIZE
        }
    }
}
