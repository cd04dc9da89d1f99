use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};
use crate::fmt::has_decimal;
use crate::models::{TransactionRecord, AMOUNT_FIELD, DATE_FIELD, NAME_FIELD};
use crate::settings::{ConverterConfig, ParsingRules, ValidationRules};

const MAX_NAME_CHARS: usize = 10;
const NAME_FORBIDDEN: &str = "()[]/\\-_=+";
const TRAILING_PUNCT: &[char] = &['；', ';', '。', '.'];

/// A date heading and everything up to the next heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateSection<'a> {
    pub date: &'a str,
    pub body: &'a str,
}

/// One entry fragment, attributed to its enclosing date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry<'a> {
    pub date: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingField(String),
    InvalidAmount(String),
}

/// Parsing rules with every pattern compiled once. Field and header patterns
/// that fail to compile are kept as `None` and never match.
pub struct CompiledRules {
    date: Regex,
    entry: Regex,
    header_name_extraction: bool,
    header_names: Vec<Regex>,
    fields: Vec<(String, Option<Regex>)>,
}

impl CompiledRules {
    pub fn new(rules: &ParsingRules) -> Result<Self> {
        let date = compile(&rules.date_pattern)?;
        let entry = compile(&rules.entry_pattern)?;

        let header_names = rules
            .header_name_patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "skipping invalid header name pattern");
                    None
                }
            })
            .collect();

        let fields = rules
            .field_patterns
            .iter()
            .map(|f| {
                let re = Regex::new(&f.pattern)
                    .map_err(|e| warn!(field = %f.name, error = %e, "invalid field pattern, field stays empty"))
                    .ok();
                (f.name.clone(), re)
            })
            .collect();

        Ok(Self {
            date,
            entry,
            header_name_extraction: rules.header_name_extraction,
            header_names,
            fields,
        })
    }

    /// Names of field patterns that failed to compile.
    pub fn invalid_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, re)| re.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Structural patterns run over the whole document, so `^` and `$` anchor
/// at line boundaries.
fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|source| LedgerError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Segmenting
// ---------------------------------------------------------------------------

/// Split content at every date heading. Text before the first heading is
/// not attributed to any date and is dropped.
pub fn segment_sections<'a>(content: &'a str, date_re: &Regex) -> Vec<DateSection<'a>> {
    let headings: Vec<(usize, &'a str)> = date_re
        .captures_iter(content)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let date = caps.get(1).unwrap_or(whole);
            Some((whole.start(), date.as_str()))
        })
        .collect();

    headings
        .iter()
        .enumerate()
        .map(|(i, &(start, date))| {
            let end = headings.get(i + 1).map_or(content.len(), |&(next, _)| next);
            DateSection {
                date,
                body: &content[start..end],
            }
        })
        .collect()
}

/// Split a section into entries. The fragment before the first entry marker
/// is the section preamble and is discarded, as are blank fragments.
pub fn split_entries<'a>(section: &DateSection<'a>, entry_re: &Regex) -> Vec<RawEntry<'a>> {
    entry_re
        .split(section.body)
        .skip(1)
        .filter(|text| !text.trim().is_empty())
        .map(|text| RawEntry {
            date: section.date,
            text,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn clean_value(raw: &str) -> String {
    raw.trim().trim_end_matches(TRAILING_PUNCT).to_string()
}

fn is_plausible_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=MAX_NAME_CHARS).contains(&len)
        && !name
            .chars()
            .any(|c| c.is_numeric() || NAME_FORBIDDEN.contains(c))
}

/// Customer name from the first non-blank line of an entry, using the first
/// pattern whose capture looks like a name.
pub fn extract_header_name(entry: &str, patterns: &[Regex]) -> Option<String> {
    let first_line = entry.lines().map(str::trim).find(|l| !l.is_empty())?;
    patterns.iter().find_map(|re| {
        let caps = re.captures(first_line)?;
        let name = clean_value(caps.get(1).or_else(|| caps.get(0))?.as_str());
        is_plausible_name(&name).then_some(name)
    })
}

pub fn extract_record(entry: &RawEntry<'_>, rules: &CompiledRules) -> TransactionRecord {
    let mut record = TransactionRecord::new();
    record.set(DATE_FIELD, entry.date);

    if rules.header_name_extraction {
        if let Some(name) = extract_header_name(entry.text, &rules.header_names) {
            record.set(NAME_FIELD, name);
        }
    }

    for (name, re) in &rules.fields {
        let found = re
            .as_ref()
            .and_then(|re| re.captures(entry.text))
            .and_then(|caps| caps.get(1).or_else(|| caps.get(0)).map(|m| clean_value(m.as_str())));
        match found {
            Some(value) => record.set(name, value),
            None => {
                let kept = record.value(name).to_string();
                record.set(name, kept);
            }
        }
    }
    record
}

pub fn validate_record(
    record: &TransactionRecord,
    rules: &ValidationRules,
) -> std::result::Result<(), Rejection> {
    if let Some(field) = rules
        .required_fields
        .iter()
        .find(|f| record.value(f).trim().is_empty())
    {
        return Err(Rejection::MissingField(field.clone()));
    }
    if rules.amount_validation {
        let amount = record.value(AMOUNT_FIELD);
        if !amount.is_empty() && !has_decimal(amount) {
            return Err(Rejection::InvalidAmount(amount.to_string()));
        }
    }
    Ok(())
}

/// Parse a markdown transaction log into validated records, in document order.
pub fn parse_markdown(content: &str, config: &ConverterConfig) -> Result<Vec<TransactionRecord>> {
    let rules = CompiledRules::new(&config.parsing_rules)?;
    let sections = segment_sections(content, &rules.date);

    let mut records = Vec::new();
    let mut rejected = 0usize;
    for section in &sections {
        if config.validation.date_validation
            && NaiveDate::parse_from_str(section.date, "%Y-%m-%d").is_err()
        {
            warn!(date = %section.date, "section heading is not a calendar date");
        }
        let entries = split_entries(section, &rules.entry);
        debug!(date = %section.date, entries = entries.len(), "section");

        for entry in &entries {
            let record = extract_record(entry, &rules);
            match validate_record(&record, &config.validation) {
                Ok(()) => records.push(record),
                Err(reason) => {
                    debug!(date = %entry.date, ?reason, "record rejected");
                    rejected += 1;
                }
            }
        }
    }

    info!(
        sections = sections.len(),
        records = records.len(),
        rejected,
        "parsed markdown"
    );
    Ok(records)
}
