//! Hand landmark data structures.
//!
//! Models the 21 landmarks per hand produced by MediaPipe-style hand
//! trackers, the five fingers built on top of them, and parsing of
//! landmark lists out of s-expressions.

use anyhow::{anyhow, bail, Context};
use lexpr::Value;

// ── Landmark definitions ───────────────────────────────────

/// The 21 hand landmarks, in tracker index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks in a complete hand pose.
pub const LANDMARK_COUNT: usize = 21;

impl HandLandmark {
    /// All landmarks in tracker index order.
    pub const ALL: [HandLandmark; LANDMARK_COUNT] = [
        Self::Wrist,
        Self::ThumbCmc,
        Self::ThumbMcp,
        Self::ThumbIp,
        Self::ThumbTip,
        Self::IndexMcp,
        Self::IndexPip,
        Self::IndexDip,
        Self::IndexTip,
        Self::MiddleMcp,
        Self::MiddlePip,
        Self::MiddleDip,
        Self::MiddleTip,
        Self::RingMcp,
        Self::RingPip,
        Self::RingDip,
        Self::RingTip,
        Self::PinkyMcp,
        Self::PinkyPip,
        Self::PinkyDip,
        Self::PinkyTip,
    ];

    /// Landmark at a pose index, `None` past the 21st.
    pub fn from_index(index: usize) -> Option<HandLandmark> {
        Self::ALL.get(index).copied()
    }

    /// Convert landmark enum to pose index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }

    /// Fingertip landmarks, thumb first.
    pub fn fingertips() -> [HandLandmark; 5] {
        Finger::ALL.map(|f| f.tip())
    }
}

// ── Fingers ────────────────────────────────────────────────

/// Number of fingers on a hand.
pub const FINGER_COUNT: usize = 5;

/// One of the five fingers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    /// All fingers, thumb first.
    pub const ALL: [Finger; FINGER_COUNT] = [
        Self::Thumb,
        Self::Index,
        Self::Middle,
        Self::Ring,
        Self::Pinky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Index => "index",
            Self::Middle => "middle",
            Self::Ring => "ring",
            Self::Pinky => "pinky",
        }
    }

    /// Fingertip landmark.
    pub fn tip(&self) -> HandLandmark {
        match self {
            Self::Thumb => HandLandmark::ThumbTip,
            Self::Index => HandLandmark::IndexTip,
            Self::Middle => HandLandmark::MiddleTip,
            Self::Ring => HandLandmark::RingTip,
            Self::Pinky => HandLandmark::PinkyTip,
        }
    }

    /// Joint the extension test compares the tip against.
    ///
    /// For the thumb this is the IP joint directly below the tip; for the
    /// other fingers it is the PIP joint, two segments down.
    pub fn reference_joint(&self) -> HandLandmark {
        match self {
            Self::Thumb => HandLandmark::ThumbIp,
            Self::Index => HandLandmark::IndexPip,
            Self::Middle => HandLandmark::MiddlePip,
            Self::Ring => HandLandmark::RingPip,
            Self::Pinky => HandLandmark::PinkyPip,
        }
    }
}

// ── Hand enum ──────────────────────────────────────────────

/// Which hand a pose belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Hand {
    Left,
    #[default]
    Right,
}

impl Hand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Parse "left"/"right" (case-insensitive).
    pub fn parse(s: &str) -> Option<Hand> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Some(Hand::Left),
            "right" => Some(Hand::Right),
            _ => None,
        }
    }
}

// ── Landmark ───────────────────────────────────────────────

/// One landmark in image-normalized coordinates.
///
/// `x` and `y` are roughly in `[0, 1]` with `y` growing downwards; `z` is
/// depth relative to the wrist, smaller meaning closer to the camera.
/// Coordinates are kept at full double precision so threshold tests see
/// exactly the value the tracker sent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Whether every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Planar (x/y) distance to another landmark.
    pub fn distance_xy(&self, other: &Landmark) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f64; 3]> for Landmark {
    fn from(p: [f64; 3]) -> Self {
        Self::new(p[0], p[1], p[2])
    }
}

// ── S-expression parsing ───────────────────────────────────

/// Parse a landmark list of the form `((x y z) (x y z) ...)`.
///
/// Any length is accepted; short poses are the classifier's concern.
/// Each element must be a proper list of exactly three numbers.
pub fn parse_landmarks(value: &Value) -> anyhow::Result<Vec<Landmark>> {
    let mut landmarks = Vec::new();
    let mut current = value;
    loop {
        match current {
            Value::Cons(pair) => {
                let index = landmarks.len();
                let point = parse_point(pair.car()).with_context(|| {
                    match HandLandmark::from_index(index) {
                        Some(name) => format!("landmark {index} ({})", name.as_str()),
                        None => format!("landmark {index}"),
                    }
                })?;
                landmarks.push(point);
                current = pair.cdr();
            }
            Value::Null => break,
            Value::Symbol(s) if s.as_ref() == "nil" => break,
            other => bail!("expected a list of landmarks, got {other}"),
        }
    }
    Ok(landmarks)
}

/// Parse a landmark document (as stored in a pose file).
pub fn parse_landmarks_str(raw: &str) -> anyhow::Result<Vec<Landmark>> {
    let value = lexpr::from_str(raw).map_err(|e| anyhow!("malformed s-expression: {e}"))?;
    parse_landmarks(&value)
}

fn parse_point(value: &Value) -> anyhow::Result<Landmark> {
    let mut coords = [0.0f64; 3];
    let mut count = 0;
    let mut current = value;
    loop {
        match current {
            Value::Cons(pair) => {
                if count == 3 {
                    bail!("expected 3 coordinates, got more");
                }
                coords[count] = as_number(pair.car())
                    .ok_or_else(|| anyhow!("coordinate {count} is not a number"))?;
                count += 1;
                current = pair.cdr();
            }
            Value::Null => break,
            other => bail!("expected (x y z), got {other}"),
        }
    }
    if count != 3 {
        bail!("expected 3 coordinates, got {count}");
    }
    Ok(Landmark::from(coords))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// ── Test helpers ───────────────────────────────────────────

/// Build a full pose with every landmark at the same position.
#[cfg(test)]
pub(crate) fn uniform_pose(x: f64, y: f64, z: f64) -> Vec<Landmark> {
    vec![Landmark::new(x, y, z); LANDMARK_COUNT]
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_count() {
        assert_eq!(HandLandmark::PinkyTip.index(), LANDMARK_COUNT - 1);
        assert_eq!(HandLandmark::Wrist.index(), 0);
    }

    #[test]
    fn test_fingertip_indices() {
        let tips: Vec<usize> = HandLandmark::fingertips().iter().map(|l| l.index()).collect();
        assert_eq!(tips, vec![4, 8, 12, 16, 20]);
    }

    #[test]
    fn test_reference_joint_indices() {
        let joints: Vec<usize> = Finger::ALL
            .iter()
            .map(|f| f.reference_joint().index())
            .collect();
        assert_eq!(joints, vec![3, 6, 10, 14, 18]);
    }

    #[test]
    fn test_from_index_matches_index() {
        for (i, landmark) in HandLandmark::ALL.iter().enumerate() {
            assert_eq!(landmark.index(), i);
            assert_eq!(HandLandmark::from_index(i), Some(*landmark));
        }
        assert_eq!(HandLandmark::from_index(LANDMARK_COUNT), None);
    }

    #[test]
    fn test_landmark_as_str() {
        assert_eq!(HandLandmark::Wrist.as_str(), "wrist");
        assert_eq!(HandLandmark::ThumbIp.as_str(), "thumb-ip");
        assert_eq!(HandLandmark::PinkyTip.as_str(), "pinky-tip");
    }

    #[test]
    fn test_hand_parse() {
        assert_eq!(Hand::parse("left"), Some(Hand::Left));
        assert_eq!(Hand::parse("Right"), Some(Hand::Right));
        assert_eq!(Hand::parse("both"), None);
        assert_eq!(Hand::default(), Hand::Right);
    }

    #[test]
    fn test_distance_xy_ignores_z() {
        let a = Landmark::new(0.0, 0.0, 0.0);
        let b = Landmark::new(3.0, 4.0, 100.0);
        assert!((a.distance_xy(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_is_finite() {
        assert!(Landmark::new(0.1, 2.0, -3.0).is_finite());
        assert!(!Landmark::new(f64::NAN, 0.0, 0.0).is_finite());
        assert!(!Landmark::new(0.0, f64::INFINITY, 0.0).is_finite());
    }

    #[test]
    fn test_parse_landmarks_triples() {
        let pose = parse_landmarks_str("((0.1 0.2 0.3) (1 -2 0.5))").unwrap();
        assert_eq!(pose.len(), 2);
        assert_eq!(pose[0], Landmark::new(0.1, 0.2, 0.3));
        assert_eq!(pose[1], Landmark::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn test_parse_keeps_double_precision() {
        let pose = parse_landmarks_str("((0.5 0.29999999999 -0.000000001))").unwrap();
        assert_eq!(pose[0].y, 0.29999999999);
        assert!(pose[0].y < 0.3);
        assert!(pose[0].z < 0.0);
    }

    #[test]
    fn test_parse_error_past_last_landmark_has_no_name() {
        let mut raw = String::from("(");
        for _ in 0..LANDMARK_COUNT {
            raw.push_str("(0 0 0) ");
        }
        raw.push_str("(0 0))");
        let err = parse_landmarks_str(&raw).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("landmark 21"), "{msg}");
        assert!(!msg.contains('('), "{msg}");
    }

    #[test]
    fn test_parse_landmarks_empty() {
        let pose = parse_landmarks_str("()").unwrap();
        assert!(pose.is_empty());
    }

    #[test]
    fn test_parse_landmarks_wrong_arity() {
        assert!(parse_landmarks_str("((0.1 0.2))").is_err());
        assert!(parse_landmarks_str("((0.1 0.2 0.3 0.4))").is_err());
    }

    #[test]
    fn test_parse_landmarks_non_numeric() {
        let err = parse_landmarks_str("((0.1 0.2 0.3) (0.1 \"y\" 0.3))").unwrap_err();
        assert!(format!("{err:#}").contains("landmark 1 (thumb-cmc)"));
    }

    #[test]
    fn test_parse_landmarks_not_a_list() {
        assert!(parse_landmarks_str("42").is_err());
        assert!(parse_landmarks_str("((0.1 0.2").is_err());
    }

    #[test]
    fn test_uniform_pose() {
        let pose = uniform_pose(0.5, 0.5, 0.0);
        assert_eq!(pose.len(), LANDMARK_COUNT);
        assert!(pose.iter().all(|l| *l == Landmark::new(0.5, 0.5, 0.0)));
    }
}
