pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid category expression: {message}")]
	ExpressionSyntax { message: String },
	#[error("Category expression has {count} distinct terms; at most {max} are supported.")]
	TermOverflow { count: usize, max: usize },
	#[error("Invalid page token: {message}")]
	InvalidToken { message: String },
	#[error("Invalid search plan: {message}")]
	InvalidPlan { message: String },
	#[error("Invalid argument: {message}")]
	InvalidArgument { message: String },
}
