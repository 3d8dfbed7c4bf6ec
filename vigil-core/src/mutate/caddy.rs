//! Line-oriented patching of a Caddyfile.
//!
//! A brand's site block is found through its upstream marker
//! (`reverse_proxy https://<target_host>`). The declaration line above it
//! lists the block's domains; new aliases are prepended there.

use tracing::debug;

use crate::error::{Result, VigilError};

/// Line prefixes that open a nested directive rather than a site block.
const DIRECTIVE_PREFIXES: &[&str] = &["@", "handle", "log", "encode", "reverse_proxy", "#"];

/// Location of a brand's site block, as 0-based line indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaddyBlock {
    pub declaration_line: usize,
    pub marker_line: usize,
    pub end_line: usize,
    pub domains: Vec<String>,
}

/// Outcome of adding an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasChange {
    /// The document with the alias prepended
    Added(String),
    /// The alias is already declared; nothing to write
    AlreadyExists,
}

pub fn marker_for(target_host: &str) -> String {
    format!("reverse_proxy https://{}", target_host)
}

fn brace_delta(line: &str) -> i64 {
    line.matches('{').count() as i64 - line.matches('}').count() as i64
}

fn is_declaration(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('{')
        && trimmed != "{"
        && !DIRECTIVE_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Domains listed before the `{` of a declaration line.
fn declared_domains(line: &str) -> Result<Vec<String>> {
    let mut parts = line.split('{');
    let head = parts.next().unwrap_or_default();
    if line.matches('{').count() != 1 {
        return Err(VigilError::MalformedDeclaration(line.trim().to_string()));
    }
    Ok(head.split_whitespace().map(str::to_string).collect())
}

/// Parsed view of a Caddyfile.
pub struct Caddyfile {
    lines: Vec<String>,
}

impl Caddyfile {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    /// Finds the site block routed to `target_host`.
    ///
    /// Markers are collected first; each is then resolved by scanning back to
    /// its declaration and forward to the closing brace. The first marker
    /// whose block closes and encloses it wins.
    pub fn locate_block(&self, target_host: &str) -> Result<CaddyBlock> {
        let marker = marker_for(target_host);
        let markers: Vec<usize> = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains(&marker))
            .map(|(i, _)| i)
            .collect();

        for marker_line in markers {
            let Some(declaration_line) = (0..=marker_line)
                .rev()
                .find(|&i| is_declaration(&self.lines[i]))
            else {
                continue;
            };

            let mut depth = brace_delta(&self.lines[declaration_line]);
            if depth <= 0 {
                continue;
            }
            let end_line = (declaration_line + 1..self.lines.len()).find(|&i| {
                depth += brace_delta(&self.lines[i]);
                depth == 0
            });

            match end_line {
                Some(end_line) if end_line >= marker_line => {
                    let domains = declared_domains(&self.lines[declaration_line])?;
                    return Ok(CaddyBlock {
                        declaration_line,
                        marker_line,
                        end_line,
                        domains,
                    });
                }
                _ => {
                    debug!(marker_line, "Skipping marker without an enclosing block");
                }
            }
        }

        Err(VigilError::BlockNotFound(marker))
    }

    /// Domains currently declared for `target_host`'s block.
    pub fn brand_domains(&self, target_host: &str) -> Result<Vec<String>> {
        Ok(self.locate_block(target_host)?.domains)
    }

    /// Prepends `domain` to the block's declaration.
    ///
    /// The result is brace-validated; on failure the caller's original
    /// document is left untouched.
    pub fn add_domain(&self, target_host: &str, domain: &str) -> Result<AliasChange> {
        let block = self.locate_block(target_host)?;
        if block.domains.iter().any(|d| d == domain) {
            return Ok(AliasChange::AlreadyExists);
        }

        let line = &self.lines[block.declaration_line];
        let indent: String = line.chars().take_while(|c| c.is_whitespace()).collect();
        let line_ending = if line.ends_with('\r') { "\r" } else { "" };

        let mut declared = vec![domain.to_string()];
        declared.extend(block.domains);
        let rewritten = format!("{}{} {{{}", indent, declared.join(" "), line_ending);

        let mut lines = self.lines.clone();
        lines[block.declaration_line] = rewritten;
        let updated = lines.join("\n");

        validate_braces(&updated)?;
        Ok(AliasChange::Added(updated))
    }
}

/// Brace depth must never go negative and must end at zero.
pub fn validate_braces(content: &str) -> Result<()> {
    let mut depth = 0i64;
    for (i, line) in content.split('\n').enumerate() {
        depth += brace_delta(line);
        if depth < 0 {
            return Err(VigilError::UnbalancedBraces(format!(
                "unexpected '}}' on line {}: {}",
                i + 1,
                line.trim()
            )));
        }
    }
    if depth != 0 {
        return Err(VigilError::UnbalancedBraces(format!(
            "{} unclosed block(s)",
            depth
        )));
    }
    Ok(())
}
