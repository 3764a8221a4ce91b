//! Test result parsing and JUnit rendering
//!
//! Test-log artifacts come in two shapes. Trial-style logs print one line per
//! test ending in a bracketed verdict, nested under their class and module
//! headings:
//!
//! ```text
//! flocker.node.test.test_agents
//!   AgentTests
//!     test_start ...                                    [OK]
//!     test_stop ...                                   [FAIL]
//! ```
//!
//! JUnit XML files are recognised by a `<testsuite` element and read one
//! `<testcase>` at a time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

static VERDICT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(\S.*?)\s*(?:\.\.\.)?\s*\[(OK|SUCCESS|FAIL|ERROR|SKIPPED|TODO)\]\s*$")
        .unwrap()
});

static HEADING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)([A-Za-z_][\w.]*)\s*$").unwrap());

static TESTCASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<testcase\b([^>]*?)(?:/>|>(.*?)</testcase>)").unwrap()
});

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#).unwrap());

/// Outcome of one test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    /// Test passed
    Passed,
    /// Test failed or errored
    Failed,
    /// Test was skipped or marked todo
    Skipped,
}

/// A single test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Test name
    pub name: String,
    /// Enclosing class or module path
    pub classname: String,
    /// Outcome
    pub outcome: TestOutcome,
    /// Failure detail, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TestCase {
    /// Creates a test case without a message
    pub fn new(name: impl Into<String>, classname: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            name: name.into(),
            classname: classname.into(),
            outcome,
            message: None,
        }
    }

    /// Attaches a failure message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Passed, failed and skipped counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCounts {
    /// Passed tests
    pub passed: usize,
    /// Failed or errored tests
    pub failed: usize,
    /// Skipped tests
    pub skipped: usize,
}

impl TestCounts {
    /// Counts the outcomes of `cases`
    #[must_use]
    pub fn from_cases(cases: &[TestCase]) -> Self {
        let mut counts = Self::default();
        for case in cases {
            counts.record(case.outcome);
        }
        counts
    }

    /// Records one outcome
    pub fn record(&mut self, outcome: TestOutcome) {
        match outcome {
            TestOutcome::Passed => self.passed += 1,
            TestOutcome::Failed => self.failed += 1,
            TestOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Adds another set of counts
    pub fn add(&mut self, other: TestCounts) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Named group of test cases, one per instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    /// Suite name
    pub name: String,
    /// Cases in report order
    pub cases: Vec<TestCase>,
}

impl TestSuite {
    /// Creates an empty suite
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    /// Outcome counts of this suite
    #[must_use]
    pub fn counts(&self) -> TestCounts {
        TestCounts::from_cases(&self.cases)
    }
}

/// Parses a test-log artifact in either supported shape
#[must_use]
pub fn parse_test_log(content: &str) -> Vec<TestCase> {
    if content.contains("<testsuite") {
        parse_junit_xml(content)
    } else {
        parse_trial_log(content)
    }
}

/// Parses trial-style verdict lines
#[must_use]
pub fn parse_trial_log(content: &str) -> Vec<TestCase> {
    let mut headings: Vec<(usize, String)> = Vec::new();
    let mut cases = Vec::new();

    for line in content.lines() {
        if let Some(caps) = VERDICT_LINE.captures(line) {
            let indent = caps[1].len();
            headings.retain(|(level, _)| *level < indent);
            let classname = headings
                .iter()
                .map(|(_, name)| name.as_str())
                .collect::<Vec<_>>()
                .join(".");
            let outcome = match &caps[3] {
                "OK" | "SUCCESS" => TestOutcome::Passed,
                "FAIL" | "ERROR" => TestOutcome::Failed,
                _ => TestOutcome::Skipped,
            };
            let mut case = TestCase::new(&caps[2], classname, outcome);
            if outcome == TestOutcome::Failed {
                case = case.with_message(&caps[3]);
            }
            cases.push(case);
        } else if let Some(caps) = HEADING_LINE.captures(line) {
            let indent = caps[1].len();
            headings.retain(|(level, _)| *level < indent);
            headings.push((indent, caps[2].to_string()));
        }
    }

    cases
}

/// Parses the `<testcase>` elements of a JUnit XML document
#[must_use]
pub fn parse_junit_xml(content: &str) -> Vec<TestCase> {
    TESTCASE
        .captures_iter(content)
        .map(|caps| {
            let mut name = String::new();
            let mut classname = String::new();
            for attr in ATTRIBUTE.captures_iter(&caps[1]) {
                match &attr[1] {
                    "name" => name = xml_unescape(&attr[2]),
                    "classname" => classname = xml_unescape(&attr[2]),
                    _ => {}
                }
            }

            let body = caps.get(2).map_or("", |m| m.as_str());
            if body.contains("<failure") || body.contains("<error") {
                TestCase::new(name, classname, TestOutcome::Failed).with_message("failure")
            } else if body.contains("<skipped") {
                TestCase::new(name, classname, TestOutcome::Skipped)
            } else {
                TestCase::new(name, classname, TestOutcome::Passed)
            }
        })
        .collect()
}

/// Renders suites as a JUnit XML document
#[must_use]
pub fn render_junit(name: &str, timestamp: &str, suites: &[TestSuite]) -> String {
    let mut totals = TestCounts::default();
    for suite in suites {
        totals.add(suite.counts());
    }

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<testsuites name=\"{}\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" timestamp=\"{}\">",
        xml_escape(name),
        totals.total(),
        totals.failed,
        totals.skipped,
        xml_escape(timestamp),
    );

    for suite in suites {
        let counts = suite.counts();
        let _ = writeln!(
            out,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" skipped=\"{}\">",
            xml_escape(&suite.name),
            counts.total(),
            counts.failed,
            counts.skipped,
        );
        for case in &suite.cases {
            let open = format!(
                "    <testcase name=\"{}\" classname=\"{}\"",
                xml_escape(&case.name),
                xml_escape(&case.classname)
            );
            match case.outcome {
                TestOutcome::Passed => {
                    let _ = writeln!(out, "{open}/>");
                }
                TestOutcome::Failed => {
                    let message = case.message.as_deref().unwrap_or("failed");
                    let _ = writeln!(out, "{open}>");
                    let _ = writeln!(out, "      <failure message=\"{}\"/>", xml_escape(message));
                    let _ = writeln!(out, "    </testcase>");
                }
                TestOutcome::Skipped => {
                    let _ = writeln!(out, "{open}>");
                    let _ = writeln!(out, "      <skipped/>");
                    let _ = writeln!(out, "    </testcase>");
                }
            }
        }
        let _ = writeln!(out, "  </testsuite>");
    }

    out.push_str("</testsuites>\n");
    out
}

fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn xml_unescape(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
