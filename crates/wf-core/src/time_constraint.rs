//! Parsing of the free-text time constraint returned by intent analysis.
//!
//! The backend hands back phrasing such as `"10 hours per week, about 3
//! months"` or `"每周 10 小时，建议 8-10 个月完成转型"`. Only two numbers are
//! extracted: the weekly study budget and the overall duration in weeks.
//! Ranges (`8-10`) are averaged; months count as 4 weeks and years as 52.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WEEKS: u32 = 4;
pub const DEFAULT_HOURS_PER_WEEK: u32 = 5;

const NUM: &str = r"(\d+(?:\.\d+)?)(?:\s*(?:-|~|–|到|至)\s*(\d+(?:\.\d+)?))?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePlan {
    pub weeks: u32,
    pub hours_per_week: u32,
}

impl Default for TimePlan {
    fn default() -> Self {
        Self {
            weeks: DEFAULT_WEEKS,
            hours_per_week: DEFAULT_HOURS_PER_WEEK,
        }
    }
}

struct Patterns {
    hours: Vec<Regex>,
    weeks: Vec<Regex>,
    months: Vec<Regex>,
    years: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |raw: String| Regex::new(&raw).expect("static time-constraint regex");
        Patterns {
            hours: vec![
                compile(format!(r"每周\s*{NUM}\s*(?:个)?(?:小时|h)")),
                compile(format!(
                    r"(?i){NUM}\s*(?:hours?|hrs?|h)\s*(?:per|a|each|/|every)\s*week"
                )),
                compile(format!(r"(?i){NUM}\s*(?:hours?|hrs?)\s*weekly")),
            ],
            weeks: vec![
                compile(format!(r"{NUM}\s*(?:个)?(?:周|星期)")),
                compile(format!(r"(?i){NUM}\s*weeks?\b")),
            ],
            months: vec![
                compile(format!(r"{NUM}\s*个?月")),
                compile(format!(r"(?i){NUM}\s*months?\b")),
            ],
            years: vec![
                compile(format!(r"{NUM}\s*年")),
                compile(format!(r"(?i){NUM}\s*years?\b")),
            ],
        }
    })
}

/// First match of any pattern, with ranges averaged.
fn first_value(text: &str, regexes: &[Regex]) -> Option<f64> {
    regexes.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let low: f64 = caps.get(1)?.as_str().parse().ok()?;
        let value = match caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok()) {
            Some(high) => (low + high) / 2.0,
            None => low,
        };
        (value > 0.0).then_some(value)
    })
}

/// Parse a time-constraint string, falling back to the defaults for any
/// part that cannot be recognised.
pub fn parse_time_constraint(text: &str) -> TimePlan {
    let p = patterns();

    let hours_per_week = first_value(text, &p.hours)
        .map(|h| h.round() as u32)
        .filter(|h| *h > 0)
        .unwrap_or(DEFAULT_HOURS_PER_WEEK);

    let weeks = first_value(text, &p.weeks)
        .or_else(|| first_value(text, &p.months).map(|m| m * 4.0))
        .or_else(|| first_value(text, &p.years).map(|y| y * 52.0))
        .map(|w| w.round() as u32)
        .filter(|w| *w > 0)
        .unwrap_or(DEFAULT_WEEKS);

    TimePlan {
        weeks,
        hours_per_week,
    }
}
