use tracing::debug;

pub const DEFAULT_DOMAIN_MIN: u32 = 2;
pub const DEFAULT_DOMAIN_MAX: u32 = 16;

/// Inclusive subtask-count range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtaskRange {
    pub min: u32,
    pub max: u32,
}

impl SubtaskRange {
    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, count: u32) -> bool {
        count >= self.min && count <= self.max
    }
}

impl std::fmt::Display for SubtaskRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Outcome of parsing one bound field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParsedBound {
    Empty,
    Value(u32),
    Invalid,
}

fn parse_bound(raw: &str) -> ParsedBound {
    let raw = raw.trim();
    if raw.is_empty() {
        return ParsedBound::Empty;
    }
    match raw.parse::<u32>() {
        Ok(v) => ParsedBound::Value(v),
        Err(_) => ParsedBound::Invalid,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubtasks {
    /// `None` when both fields are empty.
    pub range: Option<SubtaskRange>,
    pub min_invalid: bool,
    pub max_invalid: bool,
    /// Set when a crossed pair was collapsed to `min..=min`.
    pub corrected: bool,
}

impl ResolvedSubtasks {
    pub fn is_valid(&self) -> bool {
        !self.min_invalid && !self.max_invalid
    }
}

/// Turns raw min/max text into an effective range, remembering the last
/// range that was entirely valid.
#[derive(Debug, Clone)]
pub struct SubtaskInput {
    domain: SubtaskRange,
    last_valid: SubtaskRange,
}

impl SubtaskInput {
    pub fn new(domain: SubtaskRange) -> Self {
        Self {
            domain,
            last_valid: domain,
        }
    }

    pub fn domain(&self) -> SubtaskRange {
        self.domain
    }

    pub fn last_valid(&self) -> SubtaskRange {
        self.last_valid
    }

    pub fn advisory(&self) -> String {
        format!(
            "Subtasks must be between {} and {}",
            self.domain.min, self.domain.max
        )
    }

    pub fn resolve(&mut self, min_raw: &str, max_raw: &str) -> ResolvedSubtasks {
        let min_p = parse_bound(min_raw);
        let max_p = parse_bound(max_raw);

        if min_p == ParsedBound::Empty && max_p == ParsedBound::Empty {
            self.last_valid = self.domain;
            return ResolvedSubtasks {
                range: None,
                min_invalid: false,
                max_invalid: false,
                corrected: false,
            };
        }

        let min_invalid = self.bound_invalid(min_p);
        let max_invalid = self.bound_invalid(max_p);

        if min_invalid || max_invalid {
            debug!(
                min = %min_raw,
                max = %max_raw,
                fallback = %self.last_valid,
                "subtask bounds invalid; using last valid range"
            );
            return ResolvedSubtasks {
                range: Some(self.last_valid),
                min_invalid,
                max_invalid,
                corrected: false,
            };
        }

        let min = match min_p {
            ParsedBound::Value(v) => v,
            _ => self.domain.min,
        };
        let mut max = match max_p {
            ParsedBound::Value(v) => v,
            _ => self.domain.max,
        };

        let corrected = min > max;
        if corrected {
            max = min;
        }

        let range = SubtaskRange::new(min, max);
        self.last_valid = range;
        ResolvedSubtasks {
            range: Some(range),
            min_invalid: false,
            max_invalid: false,
            corrected,
        }
    }

    fn bound_invalid(&self, bound: ParsedBound) -> bool {
        match bound {
            ParsedBound::Empty => false,
            ParsedBound::Invalid => true,
            ParsedBound::Value(v) => !self.domain.contains(v),
        }
    }
}

impl Default for SubtaskInput {
    fn default() -> Self {
        Self::new(SubtaskRange::new(DEFAULT_DOMAIN_MIN, DEFAULT_DOMAIN_MAX))
    }
}
