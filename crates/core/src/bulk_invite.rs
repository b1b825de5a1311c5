//! CSV parsing for bulk organization invitations.
//!
//! Accepts a small CSV (or plain text) payload and produces validated
//! `(email, name, role)` entries. Problems are collected as messages
//! rather than returned as errors so the caller can show every issue
//! inline at once.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::roles::OrgRole;

// ── Constants ────────────────────────────────────────────────────────

/// Minimal email shape check; the server performs real validation.
pub const EMAIL_PATTERN: &str = r"^[^@]+@[^@]+\.[^@]+";

/// Case-insensitive substrings that mark the first line as a header.
pub const HEADER_MARKERS: &[&str] = &["email", "role", "name"];

/// Reported when parsing yields no usable entries.
pub const NO_VALID_EMAILS: &str = "No valid email addresses found";

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMAIL_PATTERN).expect("valid regex"));

// ── Types ────────────────────────────────────────────────────────────

/// One validated invitation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteEntry {
    pub email: String,
    pub name: Option<String>,
    pub role: OrgRole,
}

/// Outcome of parsing a bulk-invite payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InviteParseResult {
    pub entries: Vec<InviteEntry>,
    /// Human-readable problems, one per skipped line plus a summary line
    /// when nothing usable was found.
    pub errors: Vec<String>,
}

impl InviteParseResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Column positions for email, name, and role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnLayout {
    email: usize,
    name: Option<usize>,
    role: Option<usize>,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            email: 0,
            name: Some(1),
            role: Some(2),
        }
    }
}

impl ColumnLayout {
    /// Derive column positions from a header row. Columns the header does
    /// not name are dropped, except email which falls back to column 0.
    fn from_header(fields: &[String]) -> Self {
        let position = |marker: &str| {
            fields
                .iter()
                .position(|f| f.to_ascii_lowercase().contains(marker))
        };
        Self {
            email: position("email").unwrap_or(0),
            name: position("name"),
            role: position("role"),
        }
    }
}

// ── Public functions ─────────────────────────────────────────────────

/// Whether `email` has the minimal `local@domain.tld` shape.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Whether a line looks like a header row.
pub fn is_header_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    HEADER_MARKERS.iter().any(|m| lower.contains(m))
}

/// Split one CSV line on commas, honoring double-quoted fields.
///
/// A quote toggles quoted mode; inside quotes a comma is literal and a
/// doubled quote (`""`) yields one quote character. Fields are trimmed.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);

    fields.into_iter().map(|f| f.trim().to_string()).collect()
}

/// Parse a bulk-invite payload.
///
/// Rows are deduplicated by exact email (first occurrence wins) and roles
/// that are not one of `admin`, `member`, `viewer` become `default_role`.
pub fn parse_invite_csv(input: &str, default_role: OrgRole) -> InviteParseResult {
    let mut result = InviteParseResult::default();
    let mut seen: HashSet<String> = HashSet::new();

    let mut lines = input
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .peekable();

    let layout = match lines.peek() {
        Some((_, first)) if is_header_line(first) => {
            let layout = ColumnLayout::from_header(&split_csv_line(first));
            lines.next();
            layout
        }
        _ => ColumnLayout::default(),
    };

    for (line_no, line) in lines {
        let fields = split_csv_line(line);
        let email = fields.get(layout.email).map(String::as_str).unwrap_or("");

        if email.is_empty() {
            result.errors.push(format!("Line {line_no}: missing email address"));
            continue;
        }
        if !is_valid_email(email) {
            result
                .errors
                .push(format!("Line {line_no}: invalid email address '{email}'"));
            continue;
        }
        if !seen.insert(email.to_string()) {
            result
                .errors
                .push(format!("Line {line_no}: duplicate email '{email}' skipped"));
            continue;
        }

        let name = layout
            .name
            .and_then(|i| fields.get(i))
            .filter(|n| !n.is_empty())
            .cloned();
        let role = layout
            .role
            .and_then(|i| fields.get(i))
            .map(|r| OrgRole::normalize(r, default_role))
            .unwrap_or(default_role);

        result.entries.push(InviteEntry {
            email: email.to_string(),
            name,
            role,
        });
    }

    if result.entries.is_empty() {
        result.errors.push(NO_VALID_EMAILS.to_string());
    }

    result
}

// ── Tests ────────────────────────────────────────────────────────────
