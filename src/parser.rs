//! Task list parsing.
//!
//! Turns a line-oriented task list (markdown headers plus checkbox or bullet
//! items carrying inline annotations) into ordered [`Task`] records.
//!
//! ## Line grammar
//!
//! - `#`..`######` headers maintain a section stack; tasks are tagged with
//!   the innermost open section.
//! - `- [ ] text` / `- [x] text` checkbox items are tasks; a checked box
//!   yields a `completed` task.
//! - `- text` plain bullets are tasks too, unless the text looks like a
//!   `Key: value` annotation. That check is a heuristic and misses task
//!   names such as `Fix Parser: crash on empty input`.
//! - Indented non-bullet lines right below a task extend its description.
//! - Anything else is skipped.
//!
//! ## Annotations
//!
//! Annotations are stripped from the item text by independent passes over a
//! residual buffer, in this order:
//!
//! | Pass | Syntax | Effect |
//! |------|--------|--------|
//! | priority | `[P1]` `[P2]` `[P3]` | `priority` |
//! | parallel | `[P]` (only without a priority marker), `[parallel]` | `parallelizable` |
//! | duration | `[45m]` `[2h]` `[1d]` | `estimated_duration` (1d = 480 minutes) |
//! | capability | `@tester` | `required_agent_type` |
//! | dependencies | `depends: a, Build API` (rest of line, up to a `#`) | raw `dependencies` |
//! | tags | `#infra` | `tags` |
//!
//! The whitespace-normalized remainder is the task name.

use regex::Regex;
use std::sync::LazyLock;

use crate::config::{Config, DEFAULT_DURATION_MINUTES};
use crate::core::task::{Priority, Task, TaskId, TaskStatus};
use crate::mlog_trace;

/// Longest slug kept in a task id, before the `-<index>` suffix.
const MAX_SLUG_LEN: usize = 40;

/// Working minutes in a day for `[<n>d]` markers.
const MINUTES_PER_DAY: u32 = 480;

static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap());

static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+\[( |x|X)\](?:\s+(.*))?$").unwrap());

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[-*+]\s+(.*)$").unwrap());

/// A capitalized word directly followed by a colon, e.g. `Owner: sam`.
static METADATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][A-Za-z0-9_]*:").unwrap());

static PRIORITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[P([1-3])\]").unwrap());

static PARALLEL_SHORT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[P\]").unwrap());

static PARALLEL_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[parallel\]").unwrap());

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+\s*[mhd])\]").unwrap());

static DURATION_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*([mhd])\s*$").unwrap());

static CAPABILITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([\w-]+)").unwrap());

/// References run to the end of the line or the first `#` tag.
static DEPENDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)depends:\s*([^#]*)").unwrap());

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\s)#([\w-]+)").unwrap());

/// Convert a duration amount and unit (`m`, `h`, `d`) to minutes.
fn to_minutes(amount: u32, unit: &str) -> Option<u32> {
    match unit {
        "m" => Some(amount),
        "h" => amount.checked_mul(60),
        "d" => amount.checked_mul(MINUTES_PER_DAY),
        _ => None,
    }
}

/// Parse a duration such as `45m`, `2h` or `1d` into minutes.
pub fn parse_duration(text: &str) -> Option<u32> {
    let caps = DURATION_VALUE_RE.captures(text)?;
    let amount: u32 = caps[1].parse().ok()?;
    to_minutes(amount, &caps[2])
}

/// Lowercase alphanumeric runs joined by `-`, at most 40 characters.
///
/// Returns `"task"` when nothing alphanumeric remains.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        let needed = if slug.is_empty() { word.len() } else { word.len() + 1 };
        if slug.len() + needed > MAX_SLUG_LEN {
            if slug.is_empty() {
                slug = word.chars().take(MAX_SLUG_LEN).collect();
            }
            break;
        }
        if !slug.is_empty() {
            slug.push('-');
        }
        slug.push_str(&word);
    }

    if slug.is_empty() {
        "task".to_string()
    } else {
        slug
    }
}

/// Annotations pulled out of a task line.
#[derive(Debug, Default, PartialEq)]
struct Annotations {
    priority: Option<Priority>,
    parallel: bool,
    duration: Option<u32>,
    capability: Option<String>,
    dependencies: Vec<String>,
    tags: Vec<String>,
}

/// Mutable item text that each extraction pass strips its matches from.
struct Residual(String);

impl Residual {
    fn new(text: &str) -> Self {
        Self(text.to_string())
    }

    fn strip(&mut self, re: &Regex) {
        self.0 = re.replace_all(&self.0, " ").into_owned();
    }

    fn extract_priority(&mut self) -> Option<Priority> {
        let level: u8 = PRIORITY_RE.captures(&self.0)?[1].parse().ok()?;
        self.strip(&PRIORITY_RE);
        Priority::from_level(level)
    }

    /// `[P]` only counts when no priority marker was found.
    fn extract_parallel(&mut self, had_priority: bool) -> bool {
        let mut parallel = false;
        if !had_priority && PARALLEL_SHORT_RE.is_match(&self.0) {
            self.strip(&PARALLEL_SHORT_RE);
            parallel = true;
        }
        if PARALLEL_WORD_RE.is_match(&self.0) {
            self.strip(&PARALLEL_WORD_RE);
            parallel = true;
        }
        parallel
    }

    fn extract_duration(&mut self) -> Option<u32> {
        let minutes = parse_duration(&DURATION_RE.captures(&self.0)?[1]);
        self.strip(&DURATION_RE);
        minutes
    }

    fn extract_capability(&mut self) -> Option<String> {
        let capability = CAPABILITY_RE.captures(&self.0)?[1].to_string();
        self.strip(&CAPABILITY_RE);
        Some(capability)
    }

    fn extract_dependencies(&mut self) -> Vec<String> {
        let dependencies: Vec<String> = DEPENDS_RE
            .captures_iter(&self.0)
            .flat_map(|caps| {
                caps[1]
                    .split(',')
                    .map(|r| r.trim().to_string())
                    .filter(|r| !r.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();
        self.strip(&DEPENDS_RE);
        dependencies
    }

    fn extract_tags(&mut self) -> Vec<String> {
        let tags = TAG_RE
            .captures_iter(&self.0)
            .map(|caps| caps[1].to_string())
            .collect();
        self.strip(&TAG_RE);
        tags
    }

    /// Run every pass in precedence order.
    fn extract(&mut self) -> Annotations {
        let priority = self.extract_priority();
        let parallel = self.extract_parallel(priority.is_some());
        Annotations {
            priority,
            parallel,
            duration: self.extract_duration(),
            capability: self.extract_capability(),
            dependencies: self.extract_dependencies(),
            tags: self.extract_tags(),
        }
    }

    /// Whitespace-normalized remainder.
    fn into_name(self) -> String {
        self.0.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Line-oriented task list parser.
///
/// Parsing is pure: the same text always yields the same tasks and ids.
#[derive(Debug, Clone)]
pub struct TaskParser {
    default_duration: u32,
}

impl Default for TaskParser {
    fn default() -> Self {
        Self {
            default_duration: DEFAULT_DURATION_MINUTES,
        }
    }
}

impl TaskParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            default_duration: config.default_duration_minutes,
        }
    }

    /// Parse `text` into tasks in document order.
    pub fn parse(&self, text: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut sections: Vec<(usize, String)> = Vec::new();
        // Whether the previous non-blank line was a task or its description.
        let mut in_task = false;

        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                in_task = false;
                continue;
            }

            if let Some(caps) = HEADER_RE.captures(line) {
                let depth = caps[1].len();
                while sections.last().is_some_and(|(d, _)| *d >= depth) {
                    sections.pop();
                }
                sections.push((depth, caps[2].to_string()));
                in_task = false;
                continue;
            }

            let item = if let Some(caps) = CHECKBOX_RE.captures(line) {
                let status = if caps[1].eq_ignore_ascii_case("x") {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Pending
                };
                let body = caps.get(2).map_or("", |m| m.as_str());
                Some((body.to_string(), status))
            } else if let Some(caps) = BULLET_RE.captures(line) {
                if METADATA_RE.is_match(&caps[1]) {
                    mlog_trace!("parser: line {} skipped as metadata", line_no + 1);
                    in_task = false;
                    continue;
                }
                Some((caps[1].to_string(), TaskStatus::Pending))
            } else {
                None
            };

            match item {
                Some((body, status)) => {
                    let section = sections.last().map(|(_, title)| title.clone());
                    in_task = match self.build_task(&body, status, section, tasks.len()) {
                        Some(task) => {
                            mlog_trace!("parser: line {} -> task {}", line_no + 1, task.id);
                            tasks.push(task);
                            true
                        }
                        None => false,
                    };
                }
                None => {
                    let indented = line.starts_with(' ') || line.starts_with('\t');
                    match tasks.last_mut() {
                        Some(task) if in_task && indented => {
                            if !task.description.is_empty() {
                                task.description.push('\n');
                            }
                            task.description.push_str(line.trim());
                        }
                        _ => {
                            mlog_trace!("parser: line {} skipped", line_no + 1);
                            in_task = false;
                        }
                    }
                }
            }
        }

        tasks
    }

    fn build_task(
        &self,
        body: &str,
        status: TaskStatus,
        section: Option<String>,
        index: usize,
    ) -> Option<Task> {
        let mut residual = Residual::new(body);
        let annotations = residual.extract();
        let name = residual.into_name();
        if name.is_empty() {
            return None;
        }

        let mut task = Task::new(TaskId::from_slug(&slugify(&name), index), &name);
        task.priority = annotations.priority.unwrap_or_default();
        task.parallelizable = annotations.parallel;
        task.estimated_duration = annotations.duration.unwrap_or(self.default_duration);
        task.required_agent_type = annotations.capability;
        task.dependencies = annotations.dependencies;
        task.tags = annotations.tags;
        task.status = status;
        task.section = section;
        Some(task)
    }
}

/// Parse `text` with default settings.
pub fn parse(text: &str) -> Vec<Task> {
    TaskParser::default().parse(text)
}
