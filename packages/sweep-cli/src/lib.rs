use clap::builder::{
	Styles,
	styling::{AnsiColor, Effects},
};

pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

pub fn styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
		.literal(AnsiColor::Cyan.on_default() | Effects::BOLD)
		.placeholder(AnsiColor::Green.on_default())
}

/// Parses a `<lat>,<lng>` pair in decimal degrees, for use as a clap value parser.
pub fn parse_coordinate(raw: &str) -> Result<(f64, f64), String> {
	let (lat, lng) =
		raw.split_once(',').ok_or_else(|| format!("Expected <lat>,<lng>, got '{raw}'."))?;
	let lat: f64 = lat.trim().parse().map_err(|_| format!("Invalid latitude '{lat}'."))?;
	let lng: f64 = lng.trim().parse().map_err(|_| format!("Invalid longitude '{lng}'."))?;

	if !(-90.0..=90.0).contains(&lat) {
		return Err(format!("Latitude {lat} is out of range."));
	}
	if !(-180.0..=180.0).contains(&lng) {
		return Err(format!("Longitude {lng} is out of range."));
	}

	Ok((lat, lng))
}
