//! Geographic decomposition of a search radius into nested circles.
//!
//! Each circle is covered by seven children of half its radius: one sharing its center and six
//! on a ring at bearings 0°, 60°, …, 300°, placed `r·√3⁄2` away so the ring reaches the parent's
//! edge. The tree is emitted breadth-first straight into a flat list.

use std::{collections::VecDeque, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const RING_SIZE: usize = 6;
/// Children per subdivided circle: the center child plus the ring.
pub const BRANCHING: u64 = RING_SIZE as u64 + 1;
/// Upper bound on circles in one decomposition.
pub const MAX_CIRCLES: u64 = 200_000;

/// Sibling index of the child that shares its parent's center.
pub const CENTER_CHILD: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
	pub lat: f64,
	pub lng: f64,
}
impl LatLng {
	pub fn new(lat: f64, lng: f64) -> Self {
		Self { lat, lng }
	}

	fn validate(&self) -> Result<()> {
		if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
			return Err(invalid(format!("latitude {} is out of range.", self.lat)));
		}
		if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
			return Err(invalid(format!("longitude {} is out of range.", self.lng)));
		}

		Ok(())
	}
}

/// Position of a circle in the decomposition tree, rendered dotted (`1.3.4`).
///
/// The root is `1`. Child index 1 is the center child, 2 through 7 are the ring children in
/// bearing order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CirclePath(Vec<u8>);
impl CirclePath {
	pub fn root() -> Self {
		Self(vec![1])
	}

	pub fn child(&self, index: u8) -> Self {
		let mut indices = self.0.clone();

		indices.push(index);

		Self(indices)
	}

	pub fn depth(&self) -> usize {
		self.0.len() - 1
	}

	pub fn indices(&self) -> &[u8] {
		&self.0
	}

	/// Strict descendant test; a path is not its own descendant.
	pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
		self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
	}
}
impl fmt::Display for CirclePath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (position, index) in self.0.iter().enumerate() {
			if position > 0 {
				f.write_str(".")?;
			}

			write!(f, "{index}")?;
		}

		Ok(())
	}
}
impl FromStr for CirclePath {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		let indices = raw
			.split('.')
			.map(|part| match part.parse::<u8>() {
				Ok(index) if (1..=BRANCHING as u8).contains(&index) => Ok(index),
				_ => Err(invalid(format!("circle path '{raw}' has an invalid segment '{part}'."))),
			})
			.collect::<Result<Vec<_>>>()?;

		if indices.first() != Some(&1) {
			return Err(invalid(format!("circle path '{raw}' must start at the root.")));
		}

		Ok(Self(indices))
	}
}
impl TryFrom<String> for CirclePath {
	type Error = Error;

	fn try_from(raw: String) -> Result<Self> {
		raw.parse()
	}
}
impl From<CirclePath> for String {
	fn from(path: CirclePath) -> Self {
		path.to_string()
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircleStep {
	pub center: LatLng,
	pub radius_m: f64,
	pub path: CirclePath,
	pub sequence_index: usize,
	pub is_center_of_parent: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoverOptions {
	/// Radius at or below which the API is queried directly without decomposition.
	pub native_max_radius_m: f64,
	/// Cutoff for children of center circles, the root included.
	pub center_min_radius_m: f64,
	/// Cutoff for children of ring circles.
	pub ring_min_radius_m: f64,
}
impl CoverOptions {
	fn validate(&self) -> Result<()> {
		for (label, value) in [
			("native_max_radius_m", self.native_max_radius_m),
			("center_min_radius_m", self.center_min_radius_m),
			("ring_min_radius_m", self.ring_min_radius_m),
		] {
			if !value.is_finite() || value <= 0.0 {
				return Err(invalid(format!("{label} must be a positive finite number.")));
			}
		}

		Ok(())
	}

	fn subdivides(&self, radius_m: f64, is_center: bool) -> bool {
		let cutoff = if is_center { self.center_min_radius_m } else { self.ring_min_radius_m };

		radius_m / 2.0 >= cutoff
	}
}
impl Default for CoverOptions {
	fn default() -> Self {
		Self { native_max_radius_m: 50_000.0, center_min_radius_m: 500.0, ring_min_radius_m: 1_000.0 }
	}
}

/// Great-circle destination from `origin` along `bearing_deg` for `distance_m`.
pub fn destination(origin: LatLng, bearing_deg: f64, distance_m: f64) -> LatLng {
	let delta = distance_m / EARTH_RADIUS_M;
	let theta = bearing_deg.to_radians();
	let phi1 = origin.lat.to_radians();
	let lambda1 = origin.lng.to_radians();
	let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos()).asin();
	let lambda2 = lambda1
		+ (theta.sin() * delta.sin() * phi1.cos()).atan2(delta.cos() - phi1.sin() * phi2.sin());
	let lng = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;

	LatLng { lat: phi2.to_degrees(), lng }
}

/// Ring centers around `center` for a parent of radius `radius_m`.
pub fn ring_centers(center: LatLng, radius_m: f64) -> [LatLng; RING_SIZE] {
	let distance = radius_m * 3.0_f64.sqrt() / 2.0;

	std::array::from_fn(|slot| destination(center, slot as f64 * 60.0, distance))
}

/// Number of circles [`cover`] emits, without computing coordinates.
pub fn count_circles(radius_m: f64, options: &CoverOptions) -> u64 {
	fn subtree(radius_m: f64, is_center: bool, options: &CoverOptions) -> u64 {
		if !options.subdivides(radius_m, is_center) {
			return 1;
		}

		let child = radius_m / 2.0;
		let ring = subtree(child, false, options);

		subtree(child, true, options)
			.saturating_add(ring.saturating_mul(RING_SIZE as u64))
			.saturating_add(1)
	}

	if radius_m <= options.native_max_radius_m {
		return 1;
	}

	subtree(radius_m, true, options)
}

/// Decomposes the circle at `center` with `radius_m` into a breadth-first list of steps.
pub fn cover(center: LatLng, radius_m: f64, options: &CoverOptions) -> Result<Vec<CircleStep>> {
	center.validate()?;
	options.validate()?;

	if !radius_m.is_finite() || radius_m <= 0.0 {
		return Err(invalid(format!("radius {radius_m} must be a positive finite number.")));
	}

	let total = count_circles(radius_m, options);

	if total > MAX_CIRCLES {
		return Err(invalid(format!(
			"radius {radius_m} m decomposes into {total} circles; at most {MAX_CIRCLES} are supported."
		)));
	}

	let mut steps = Vec::with_capacity(total as usize);

	if radius_m <= options.native_max_radius_m {
		steps.push(CircleStep {
			center,
			radius_m,
			path: CirclePath::root(),
			sequence_index: 0,
			is_center_of_parent: false,
		});

		return Ok(steps);
	}

	let mut queue = VecDeque::from([(center, radius_m, CirclePath::root(), false)]);

	while let Some((center, radius_m, path, is_center_of_parent)) = queue.pop_front() {
		// The root counts as a center circle for cutoff purposes.
		let is_center = is_center_of_parent || path.depth() == 0;

		if options.subdivides(radius_m, is_center) {
			let child_radius = radius_m / 2.0;

			queue.push_back((center, child_radius, path.child(CENTER_CHILD), true));

			for (slot, ring_center) in ring_centers(center, radius_m).into_iter().enumerate() {
				queue.push_back((ring_center, child_radius, path.child(slot as u8 + 2), false));
			}
		}

		steps.push(CircleStep {
			center,
			radius_m,
			path,
			sequence_index: steps.len(),
			is_center_of_parent,
		});
	}

	Ok(steps)
}

fn invalid(message: String) -> Error {
	Error::InvalidArgument { message }
}
