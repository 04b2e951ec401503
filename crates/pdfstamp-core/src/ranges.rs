//! Page selection parsing and range-to-position resolution
//!
//! A selection expression is a comma-separated list of tokens, each a
//! single page number or a hyphenated range. Besides the membership
//! set, parsing records the larger endpoint of every range in
//! declaration order; those ends drive position resolution during
//! assembly.

use std::collections::BTreeSet;

use crate::error::StampError;

/// Pages chosen to be stamped, plus the range ends used to pick a
/// position per page.
///
/// `range_ends` keeps declaration order, not numeric order. Duplicates
/// and overlapping ranges are legal; a range entered as "45-5" is
/// normalized to 5-45 and contributes 45 as its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
    range_ends: Vec<u32>,
}

impl PageSelection {
    /// Parse a selection expression.
    ///
    /// An empty expression selects every page `1..=page_count` with a
    /// single range end of `page_count`. Page numbers are not checked
    /// against the document; out-of-range pages simply never come up
    /// during assembly.
    pub fn parse(input: &str, page_count: u32) -> Result<Self, StampError> {
        let mut pages = BTreeSet::new();
        let mut range_ends = Vec::new();

        let input = input.trim();
        if input.is_empty() {
            pages.extend(1..=page_count);
            range_ends.push(page_count);
            return Ok(Self { pages, range_ends });
        }

        for token in input.split(',') {
            let token = token.trim();
            let (start, end) = match token.split_once('-') {
                Some((a, b)) => (parse_page(a)?, parse_page(b)?),
                None => {
                    let n = parse_page(token)?;
                    (n, n)
                }
            };
            // normalize reversed ranges
            let (start, end) = if start > end { (end, start) } else { (start, end) };

            pages.extend(start..=end);
            range_ends.push(end);
        }

        Ok(Self { pages, range_ends })
    }

    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.pages.iter().copied()
    }

    /// Range ends in declaration order.
    pub fn range_ends(&self) -> &[u32] {
        &self.range_ends
    }

    /// Drop trailing range ends so at most `len` remain.
    ///
    /// Applied when fewer positions than ranges were declared: the
    /// extra ranges lose their own position and resolve against the
    /// remaining ends.
    pub fn truncate_ends(&mut self, len: usize) {
        self.range_ends.truncate(len);
    }

    /// Position index governing `page`: the index of the smallest
    /// range end `>= page`, first declared on ties.
    ///
    /// A later, narrower range wins over an earlier, broader one no
    /// matter the declaration order. Returns `None` when `page`
    /// exceeds every end; callers must treat that as fatal rather
    /// than guess a position.
    pub fn resolve(&self, page: u32) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (index, &end) in self.range_ends.iter().enumerate() {
            if page <= end {
                match best {
                    Some((_, found)) if found <= end => {}
                    _ => best = Some((index, end)),
                }
            }
        }
        best.map(|(index, _)| index)
    }
}

fn parse_page(token: &str) -> Result<u32, StampError> {
    token
        .trim()
        .parse()
        .map_err(|_| StampError::MalformedInput(format!("wrong value for pages: '{}'", token.trim())))
}
