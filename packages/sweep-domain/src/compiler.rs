//! Category expression compiler.
//!
//! An expression such as `(cafe AND wifi) OR library AND NOT construction` is parsed, rewritten
//! to disjunctive normal form and emitted as an ordered list of [`PrimitiveQuery`] values, each
//! one include/exclude pair the places API accepts directly. Simple clauses come first, ordered
//! by popularity, and every query excludes the terms already claimed by earlier ones so no place
//! is counted twice.

use std::{
	collections::{BTreeMap, BTreeSet},
	iter::Peekable,
	str::CharIndices,
};

use serde::{Deserialize, Serialize};

use crate::{
	CategoryTerm, Error, PopularityModel, Result,
	terms::{self, TermMapping},
};

/// One include/exclude pair of category sets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveQuery {
	pub included: BTreeSet<CategoryTerm>,
	pub excluded: BTreeSet<CategoryTerm>,
}
impl PrimitiveQuery {
	/// Whether a place carrying the categories accepted by `has` falls inside this query.
	pub fn matches<F>(&self, has: F) -> bool
	where
		F: Fn(&str) -> bool,
	{
		self.included.iter().all(|term| has(term)) && !self.excluded.iter().any(|term| has(term))
	}

	/// Stable human-readable form, e.g. `+cafe -bar -pub`.
	pub fn signature(&self) -> String {
		let included = self.included.iter().map(|term| format!("+{term}"));
		let excluded = self.excluded.iter().map(|term| format!("-{term}"));

		included.chain(excluded).collect::<Vec<_>>().join(" ")
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Literal {
	pub term: CategoryTerm,
	pub negated: bool,
}

/// A conjunction of literals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
	pub literals: Vec<Literal>,
}
impl Clause {
	pub fn is_simple(&self) -> bool {
		self.literals.len() == 1
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dnf {
	pub clauses: Vec<Clause>,
	rendered: String,
}
impl Dnf {
	/// The normal form in symbolic operator syntax, e.g. `cafe & wifi | ~bar`.
	pub fn render(&self) -> &str {
		&self.rendered
	}
}

/// A parsed category expression over at most [`terms::MAX_TERMS`] terms.
#[derive(Clone, Debug)]
pub struct CategoryExpression {
	expr: Expr,
	mapping: TermMapping,
}
impl CategoryExpression {
	pub fn parse(expression: &str) -> Result<Self> {
		let normalized = terms::normalize_operators(expression);
		let (mapped, mapping) = terms::map_terms(&normalized)?;
		let expr = Parser::new(&mapped, &mapping).parse()?;

		Ok(Self { expr, mapping })
	}

	pub fn terms(&self) -> impl Iterator<Item = &str> {
		self.mapping.iter().map(|(_, term)| term)
	}

	/// Evaluates the expression for a place whose categories are accepted by `has`.
	pub fn evaluate<F>(&self, has: F) -> bool
	where
		F: Fn(&str) -> bool,
	{
		self.expr.evaluate(&|symbol| self.mapping.term(symbol).map(&has).unwrap_or(false))
	}

	pub fn to_dnf(&self) -> Dnf {
		let clauses = to_dnf(&self.expr, false);
		let rendered = clauses
			.iter()
			.map(|clause| {
				clause
					.iter()
					.map(|(symbol, negated)| if *negated { format!("~{symbol}") } else { symbol.to_string() })
					.collect::<Vec<_>>()
					.join(" & ")
			})
			.collect::<Vec<_>>()
			.join(" | ");
		let clauses = clauses
			.into_iter()
			.map(|clause| Clause {
				literals: clause
					.into_iter()
					.map(|(symbol, negated)| Literal {
						term: self.mapping.term(symbol).unwrap_or_default().to_string(),
						negated,
					})
					.collect(),
			})
			.collect();

		Dnf { clauses, rendered: self.mapping.unmap(&rendered) }
	}
}

pub fn compile_dnf(expression: &str) -> Result<Dnf> {
	Ok(CategoryExpression::parse(expression)?.to_dnf())
}

/// Compiles `expression` into the ordered primitive queries that together cover it exactly once.
///
/// Without a popularity model every term scores 1.0 and simple clauses keep their normal-form
/// order. With a model, terms missing from it score 0.0.
pub fn compile(
	expression: &str,
	popularity: Option<&PopularityModel>,
) -> Result<Vec<PrimitiveQuery>> {
	let dnf = compile_dnf(expression)?;
	let score = |term: &str| match popularity {
		Some(model) => model.get(term).copied().unwrap_or(0.0),
		None => 1.0,
	};
	let (mut simple, compound): (Vec<Clause>, Vec<Clause>) =
		dnf.clauses.into_iter().partition(Clause::is_simple);

	simple.sort_by(|a, b| score(&b.literals[0].term).total_cmp(&score(&a.literals[0].term)));

	let mut processed = BTreeSet::new();
	let mut queries = Vec::with_capacity(simple.len() + compound.len());

	for clause in simple {
		let Literal { term, negated } = &clause.literals[0];

		if *negated {
			let mut excluded = processed.clone();

			excluded.insert(term.clone());
			queries.push(PrimitiveQuery { included: BTreeSet::new(), excluded });
		} else {
			queries.push(PrimitiveQuery {
				included: BTreeSet::from([term.clone()]),
				excluded: processed.clone(),
			});
			processed.insert(term.clone());
		}
	}
	for clause in compound {
		let mut query = PrimitiveQuery { included: BTreeSet::new(), excluded: processed.clone() };

		for literal in clause.literals {
			if literal.negated {
				query.excluded.insert(literal.term);
			} else {
				query.included.insert(literal.term);
			}
		}

		queries.push(query);
	}

	Ok(queries)
}

/// Collapses the whole expression into one representative query.
///
/// A term that is positive in one clause and negated in another cannot be expressed by a single
/// query; it is dropped from both sets and logged.
pub fn reduce_to_single(expression: &str) -> Result<PrimitiveQuery> {
	let dnf = compile_dnf(expression)?;
	let mut query = PrimitiveQuery::default();

	for literal in dnf.clauses.into_iter().flat_map(|clause| clause.literals) {
		if literal.negated {
			query.excluded.insert(literal.term);
		} else {
			query.included.insert(literal.term);
		}
	}

	let conflicts = query.included.intersection(&query.excluded).cloned().collect::<Vec<_>>();

	for term in conflicts {
		tracing::warn!(
			term = %term,
			expression,
			"Dropping category that is both included and excluded in single-query reduction."
		);

		query.included.remove(&term);
		query.excluded.remove(&term);
	}

	Ok(query)
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Expr {
	Var(char),
	Not(Box<Expr>),
	And(Vec<Expr>),
	Or(Vec<Expr>),
}
impl Expr {
	fn evaluate(&self, var: &dyn Fn(char) -> bool) -> bool {
		match self {
			Self::Var(symbol) => var(*symbol),
			Self::Not(inner) => !inner.evaluate(var),
			Self::And(nodes) => nodes.iter().all(|node| node.evaluate(var)),
			Self::Or(nodes) => nodes.iter().any(|node| node.evaluate(var)),
		}
	}
}

/// Symbol to `negated` flag.
type SymbolClause = BTreeMap<char, bool>;

fn to_dnf(expr: &Expr, negate: bool) -> Vec<SymbolClause> {
	let clauses = match (expr, negate) {
		(Expr::Var(symbol), _) => vec![SymbolClause::from([(*symbol, negate)])],
		(Expr::Not(inner), _) => to_dnf(inner, !negate),
		(Expr::And(nodes), false) | (Expr::Or(nodes), true) => {
			let mut acc = vec![SymbolClause::new()];

			for node in nodes {
				let rhs = to_dnf(node, negate);
				let mut product = Vec::with_capacity(acc.len() * rhs.len());

				for left in &acc {
					for right in &rhs {
						if let Some(merged) = conjoin(left, right) {
							product.push(merged);
						}
					}
				}

				acc = simplify(product);
			}

			acc
		},
		(Expr::Or(nodes), false) | (Expr::And(nodes), true) =>
			nodes.iter().flat_map(|node| to_dnf(node, negate)).collect(),
	};

	simplify(clauses)
}

fn conjoin(left: &SymbolClause, right: &SymbolClause) -> Option<SymbolClause> {
	let mut merged = left.clone();

	for (symbol, negated) in right {
		match merged.get(symbol) {
			Some(existing) if existing != negated => return None,
			_ => {
				merged.insert(*symbol, *negated);
			},
		}
	}

	Some(merged)
}

/// Deduplicates, drops absorbed clauses and sorts by (size, literals).
fn simplify(mut clauses: Vec<SymbolClause>) -> Vec<SymbolClause> {
	clauses.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.iter().cmp(b.iter())));
	clauses.dedup();

	let mut kept: Vec<SymbolClause> = Vec::with_capacity(clauses.len());

	for clause in clauses {
		let absorbed = kept
			.iter()
			.any(|smaller| smaller.iter().all(|(symbol, negated)| clause.get(symbol) == Some(negated)));

		if !absorbed {
			kept.push(clause);
		}
	}

	kept
}

struct Parser<'a> {
	chars: Peekable<CharIndices<'a>>,
	mapping: &'a TermMapping,
}
impl<'a> Parser<'a> {
	fn new(source: &'a str, mapping: &'a TermMapping) -> Self {
		Self { chars: source.char_indices().peekable(), mapping }
	}

	fn parse(mut self) -> Result<Expr> {
		if self.peek().is_none() {
			return Err(syntax_error("expression is empty"));
		}

		let expr = self.parse_or()?;

		match self.peek() {
			None => Ok(expr),
			Some((offset, ch)) => Err(self.unexpected(offset, ch)),
		}
	}

	fn parse_or(&mut self) -> Result<Expr> {
		let mut nodes = vec![self.parse_and()?];

		while self.eat('|') {
			nodes.push(self.parse_and()?);
		}

		Ok(if nodes.len() == 1 { nodes.remove(0) } else { Expr::Or(nodes) })
	}

	fn parse_and(&mut self) -> Result<Expr> {
		let mut nodes = vec![self.parse_unary()?];

		while self.eat('&') {
			nodes.push(self.parse_unary()?);
		}

		Ok(if nodes.len() == 1 { nodes.remove(0) } else { Expr::And(nodes) })
	}

	fn parse_unary(&mut self) -> Result<Expr> {
		if self.eat('~') {
			return Ok(Expr::Not(Box::new(self.parse_unary()?)));
		}

		self.parse_primary()
	}

	fn parse_primary(&mut self) -> Result<Expr> {
		let Some((offset, ch)) = self.peek() else {
			return Err(syntax_error("unexpected end of expression"));
		};

		if ch == '(' {
			self.chars.next();

			let inner = self.parse_or()?;

			if !self.eat(')') {
				return Err(syntax_error("missing closing parenthesis"));
			}

			return Ok(inner);
		}
		if self.mapping.term(ch).is_some() {
			self.chars.next();

			return Ok(Expr::Var(ch));
		}

		Err(self.unexpected(offset, ch))
	}

	fn peek(&mut self) -> Option<(usize, char)> {
		while let Some((_, ch)) = self.chars.peek() {
			if !ch.is_whitespace() {
				break;
			}

			self.chars.next();
		}

		self.chars.peek().copied()
	}

	fn eat(&mut self, expected: char) -> bool {
		if matches!(self.peek(), Some((_, ch)) if ch == expected) {
			self.chars.next();

			return true;
		}

		false
	}

	fn unexpected(&self, offset: usize, ch: char) -> Error {
		match self.mapping.term(ch) {
			Some(term) => syntax_error(&format!("unexpected term '{term}'")),
			None => syntax_error(&format!("unexpected '{ch}' at mapped offset {offset}")),
		}
	}
}

fn syntax_error(message: &str) -> Error {
	Error::ExpressionSyntax { message: message.to_string() }
}
