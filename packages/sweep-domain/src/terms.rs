//! Term mapping between free-text category names and single-letter symbols.
//!
//! Category names may contain substrings such as `or` or `and` (`shoe_store`, `candle_shop`),
//! so they are swapped for one-character symbols before the expression is parsed.

use std::collections::BTreeMap;

use crate::{CategoryTerm, Error, Result};

/// Maximum number of distinct terms per expression: one per lowercase ASCII letter.
pub const MAX_TERMS: usize = 26;

const KEYWORDS: [(&str, char); 3] = [("and", '&'), ("or", '|'), ("not", '~')];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TermMapping {
	terms: Vec<CategoryTerm>,
	symbols: BTreeMap<CategoryTerm, char>,
}
impl TermMapping {
	pub fn len(&self) -> usize {
		self.terms.len()
	}

	pub fn is_empty(&self) -> bool {
		self.terms.is_empty()
	}

	pub fn term(&self, symbol: char) -> Option<&str> {
		let index = symbol_index(symbol)?;

		self.terms.get(index).map(String::as_str)
	}

	pub fn symbol(&self, term: &str) -> Option<char> {
		self.symbols.get(term).copied()
	}

	/// Terms in symbol order, which is also first-seen order.
	pub fn iter(&self) -> impl Iterator<Item = (char, &str)> {
		self.terms.iter().enumerate().map(|(index, term)| (symbol_for(index), term.as_str()))
	}

	/// Substitutes every mapped symbol in `mapped` with its term in a single pass.
	pub fn unmap(&self, mapped: &str) -> String {
		let mut out = String::with_capacity(mapped.len() * 4);

		for ch in mapped.chars() {
			match self.term(ch) {
				Some(term) => out.push_str(term),
				None => out.push(ch),
			}
		}

		out
	}

	fn insert(&mut self, term: &str) -> Result<char> {
		if let Some(symbol) = self.symbols.get(term) {
			return Ok(*symbol);
		}
		if self.terms.len() == MAX_TERMS {
			return Err(Error::TermOverflow { count: MAX_TERMS + 1, max: MAX_TERMS });
		}

		let symbol = symbol_for(self.terms.len());

		self.terms.push(term.to_string());
		self.symbols.insert(term.to_string(), symbol);

		Ok(symbol)
	}
}

/// Rewrites case-insensitive `and`, `or` and `not` words to `&`, `|` and `~`.
pub fn normalize_operators(expression: &str) -> String {
	rewrite_words(expression, |word, out| match keyword_symbol(word) {
		Some(symbol) => out.push(symbol),
		None => out.push_str(word),
	})
}

/// Replaces each distinct term with a symbol `a`, `b`, `c`, … in first-seen order.
///
/// Operator keywords are left untouched so callers may map before or after
/// [`normalize_operators`].
pub fn map_terms(expression: &str) -> Result<(String, TermMapping)> {
	let mut mapping = TermMapping::default();
	let mut overflow = Vec::new();
	let mapped = rewrite_words(expression, |word, out| {
		if keyword_symbol(word).is_some() {
			out.push_str(word);

			return;
		}

		match mapping.insert(word) {
			Ok(symbol) => out.push(symbol),
			Err(_) => {
				if !overflow.iter().any(|seen: &String| seen == word) {
					overflow.push(word.to_string());
				}
			},
		}
	});

	if !overflow.is_empty() {
		return Err(Error::TermOverflow { count: MAX_TERMS + overflow.len(), max: MAX_TERMS });
	}

	Ok((mapped, mapping))
}

fn rewrite_words<F>(expression: &str, mut on_word: F) -> String
where
	F: FnMut(&str, &mut String),
{
	let mut out = String::with_capacity(expression.len());
	let mut word_start = None;

	for (offset, ch) in expression.char_indices() {
		if is_term_char(ch) {
			word_start.get_or_insert(offset);

			continue;
		}
		if let Some(start) = word_start.take() {
			on_word(&expression[start..offset], &mut out);
		}

		out.push(ch);
	}

	if let Some(start) = word_start {
		on_word(&expression[start..], &mut out);
	}

	out
}

fn is_term_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

fn keyword_symbol(word: &str) -> Option<char> {
	KEYWORDS
		.iter()
		.find(|(keyword, _)| word.eq_ignore_ascii_case(keyword))
		.map(|(_, symbol)| *symbol)
}

fn symbol_for(index: usize) -> char {
	char::from(b'a' + index as u8)
}

fn symbol_index(symbol: char) -> Option<usize> {
	symbol.is_ascii_lowercase().then(|| (symbol as u8 - b'a') as usize)
}
