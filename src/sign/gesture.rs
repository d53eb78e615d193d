//! Sign gesture recognition from hand landmarks.
//!
//! A fixed bank of rules scores one pose each; the best score wins.
//! Every call is independent: there is no per-hand state, debouncing or
//! hold tracking, and the rule bank is a `static` table.

use tracing::debug;

use super::landmarks::{Finger, HandLandmark, Landmark, FINGER_COUNT, LANDMARK_COUNT};

/// Label reported when no rule beats the floor or the pose is unusable.
pub const UNKNOWN_GESTURE: &str = "unknown";

/// Confidence of the `unknown` fallback.
pub const CONFIDENCE_FLOOR: f32 = 0.1;

/// Upper bound on any reported confidence.
pub const CONFIDENCE_CAP: f32 = 0.95;

/// Score a rule returns when its geometric test fails.
const MISS: f32 = 0.2;

/// Maximum distance of a fingertip from the fingertip centroid for "more".
const MORE_RADIUS: f64 = 0.1;

// ── Gesture types ──────────────────────────────────────────

/// Recognized sign gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignGesture {
    /// Open hand.
    Hello,
    /// Hand raised near the chin.
    ThankYou,
    /// Thumbs up.
    Yes,
    /// Index finger raised alone.
    No,
    /// Open palm pushed towards the camera.
    Help,
    /// Flat hand, four fingers up.
    Stop,
    /// Flat hand at chest height.
    Please,
    /// Curled hand near the mouth.
    Water,
    /// Fingertips pinched together.
    More,
    /// Open hand, done.
    Finished,
}

impl SignGesture {
    /// All gestures in rule evaluation order.
    pub const ALL: [SignGesture; 10] = [
        Self::Hello,
        Self::ThankYou,
        Self::Yes,
        Self::No,
        Self::Help,
        Self::Stop,
        Self::Please,
        Self::Water,
        Self::More,
        Self::Finished,
    ];

    /// String representation for IPC.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::ThankYou => "thank_you",
            Self::Yes => "yes",
            Self::No => "no",
            Self::Help => "help",
            Self::Stop => "stop",
            Self::Please => "please",
            Self::Water => "water",
            Self::More => "more",
            Self::Finished => "finished",
        }
    }
}

// ── Rule bank ──────────────────────────────────────────────

/// Score function for one gesture. Only ever called with a complete,
/// finite pose.
pub type RuleFn = fn(&[Landmark]) -> f32;

/// A named scoring rule.
#[derive(Clone, Copy)]
pub struct GestureRule {
    pub gesture: SignGesture,
    check: RuleFn,
}

impl GestureRule {
    const fn new(gesture: SignGesture, check: RuleFn) -> Self {
        Self { gesture, check }
    }
}

impl std::fmt::Debug for GestureRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureRule")
            .field("gesture", &self.gesture)
            .finish()
    }
}

/// The rule bank. Order matters: on equal scores the earlier rule wins.
pub static RULE_BANK: [GestureRule; 10] = [
    GestureRule::new(SignGesture::Hello, check_hello),
    GestureRule::new(SignGesture::ThankYou, check_thank_you),
    GestureRule::new(SignGesture::Yes, check_yes),
    GestureRule::new(SignGesture::No, check_no),
    GestureRule::new(SignGesture::Help, check_help),
    GestureRule::new(SignGesture::Stop, check_stop),
    GestureRule::new(SignGesture::Please, check_please),
    GestureRule::new(SignGesture::Water, check_water),
    GestureRule::new(SignGesture::More, check_more),
    GestureRule::new(SignGesture::Finished, check_finished),
];

fn check_hello(pose: &[Landmark]) -> f32 {
    if extended_count(&finger_states(pose)) >= 4 {
        0.8
    } else {
        MISS
    }
}

fn check_thank_you(pose: &[Landmark]) -> f32 {
    if wrist(pose).y < 0.3 {
        0.7
    } else {
        MISS
    }
}

fn check_yes(pose: &[Landmark]) -> f32 {
    let ext = finger_states(pose);
    if ext[0] && !ext[1..].iter().any(|&e| e) {
        0.8
    } else {
        MISS
    }
}

fn check_no(pose: &[Landmark]) -> f32 {
    let ext = finger_states(pose);
    if !ext[0] && ext[1] && !ext[2..].iter().any(|&e| e) {
        0.7
    } else {
        MISS
    }
}

fn check_help(pose: &[Landmark]) -> f32 {
    if extended_count(&finger_states(pose)) >= 3 && wrist(pose).z < 0.0 {
        0.6
    } else {
        MISS
    }
}

fn check_stop(pose: &[Landmark]) -> f32 {
    let ext = finger_states(pose);
    if extended_count(&ext[1..]) >= 3 {
        0.7
    } else {
        MISS
    }
}

fn check_please(pose: &[Landmark]) -> f32 {
    let y = wrist(pose).y;
    if extended_count(&finger_states(pose)) >= 3 && y > 0.3 && y < 0.7 {
        0.6
    } else {
        MISS
    }
}

fn check_water(pose: &[Landmark]) -> f32 {
    if extended_count(&finger_states(pose)) <= 2 && wrist(pose).y < 0.4 {
        0.6
    } else {
        MISS
    }
}

fn check_more(pose: &[Landmark]) -> f32 {
    let tips = HandLandmark::fingertips().map(|t| pose[t.index()]);
    let n = tips.len() as f64;
    let centroid = Landmark::new(
        tips.iter().map(|t| t.x).sum::<f64>() / n,
        tips.iter().map(|t| t.y).sum::<f64>() / n,
        0.0,
    );
    if tips.iter().all(|t| t.distance_xy(&centroid) < MORE_RADIUS) {
        0.7
    } else {
        MISS
    }
}

fn check_finished(pose: &[Landmark]) -> f32 {
    if extended_count(&finger_states(pose)) >= 3 {
        0.5
    } else {
        MISS
    }
}

// ── Feature extraction ─────────────────────────────────────

/// Which fingers are extended, thumb first.
///
/// Returns `None` for poses with fewer than 21 landmarks. The test assumes
/// an upright hand facing the camera: the thumb is extended when its tip
/// lies to the right of its IP joint, any other finger when its tip lies
/// above its PIP joint. No handedness or rotation correction is applied.
pub fn extended_fingers(pose: &[Landmark]) -> Option<[bool; FINGER_COUNT]> {
    if pose.len() < LANDMARK_COUNT {
        return None;
    }
    Some(finger_states(pose))
}

fn finger_states(pose: &[Landmark]) -> [bool; FINGER_COUNT] {
    Finger::ALL.map(|finger| {
        let tip = pose[finger.tip().index()];
        let joint = pose[finger.reference_joint().index()];
        match finger {
            Finger::Thumb => tip.x > joint.x,
            _ => tip.y < joint.y,
        }
    })
}

fn extended_count(states: &[bool]) -> usize {
    states.iter().filter(|&&e| e).count()
}

fn wrist(pose: &[Landmark]) -> Landmark {
    pose[HandLandmark::Wrist.index()]
}

// ── Classification ─────────────────────────────────────────

/// Outcome of classifying one pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Winning gesture, `None` for `unknown`.
    pub gesture: Option<SignGesture>,
    /// Confidence in `[CONFIDENCE_FLOOR, CONFIDENCE_CAP]`.
    pub confidence: f32,
}

impl Classification {
    /// The floor fallback.
    pub fn unknown() -> Self {
        Self {
            gesture: None,
            confidence: CONFIDENCE_FLOOR,
        }
    }

    /// Gesture name, or `"unknown"`.
    pub fn label(&self) -> &'static str {
        self.gesture
            .map(|g| g.as_str())
            .unwrap_or(UNKNOWN_GESTURE)
    }

    pub fn is_unknown(&self) -> bool {
        self.gesture.is_none()
    }
}

/// Stateless classifier over a rule bank.
///
/// Holds only a shared reference to an immutable table, so it is `Copy`
/// and may be used from any number of threads at once.
#[derive(Debug, Clone, Copy)]
pub struct GestureClassifier {
    rules: &'static [GestureRule],
}

impl GestureClassifier {
    /// Classifier over the standard rule bank.
    pub const fn new() -> Self {
        Self { rules: &RULE_BANK }
    }

    /// Gestures this classifier can report, in evaluation order.
    pub fn gestures(&self) -> impl Iterator<Item = SignGesture> + '_ {
        self.rules.iter().map(|r| r.gesture)
    }

    /// Number of rules in the bank.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Classify one pose.
    ///
    /// Poses with fewer than 21 landmarks, or with a non-finite coordinate
    /// in the first 21, yield the `unknown` fallback. Landmarks past the
    /// 21st are ignored.
    pub fn classify(&self, pose: &[Landmark]) -> Classification {
        let Some(pose) = usable_pose(pose) else {
            debug!(len = pose.len(), "unusable pose, reporting unknown");
            return Classification::unknown();
        };

        let mut best = Classification::unknown();
        for rule in self.rules {
            let confidence = (rule.check)(pose);
            if confidence > best.confidence {
                best = Classification {
                    gesture: Some(rule.gesture),
                    confidence,
                };
            }
        }
        best.confidence = best.confidence.min(CONFIDENCE_CAP);

        debug!(gesture = best.label(), confidence = best.confidence, "pose classified");
        best
    }

    /// Every rule's raw score, in evaluation order.
    ///
    /// Empty when the pose would classify as `unknown` by validation.
    pub fn evaluate(&self, pose: &[Landmark]) -> Vec<(SignGesture, f32)> {
        match usable_pose(pose) {
            Some(pose) => self
                .rules
                .iter()
                .map(|rule| (rule.gesture, (rule.check)(pose)))
                .collect(),
            None => Vec::new(),
        }
    }

    #[cfg(test)]
    fn with_rules(rules: &'static [GestureRule]) -> Self {
        Self { rules }
    }
}

impl Default for GestureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// The first 21 landmarks, if present and finite.
fn usable_pose(pose: &[Landmark]) -> Option<&[Landmark]> {
    let pose = pose.get(..LANDMARK_COUNT)?;
    pose.iter().all(Landmark::is_finite).then_some(pose)
}

/// Classify a pose with the standard rule bank.
pub fn classify(pose: &[Landmark]) -> Classification {
    GestureClassifier::new().classify(pose)
}

/// Names of all supported gestures, in evaluation order.
pub fn supported_gestures() -> [&'static str; 10] {
    SignGesture::ALL.map(|g| g.as_str())
}

// ── Test helpers ───────────────────────────────────────────

/// Neutral pose: wrist mid-frame, every finger curled, tips spread apart.
#[cfg(test)]
pub(crate) fn curled_pose() -> Vec<Landmark> {
    let mut pose = super::landmarks::uniform_pose(0.5, 0.5, 0.0);
    for (i, finger) in Finger::ALL.iter().enumerate() {
        let x = 0.1 + 0.2 * i as f64;
        // Joint right of and above the tip: nothing extended.
        pose[finger.reference_joint().index()] = Landmark::new(x + 0.05, 0.3, 0.0);
        pose[finger.tip().index()] = Landmark::new(x, 0.6, 0.0);
    }
    pose
}

/// Set a finger's extension state on an existing pose.
#[cfg(test)]
pub(crate) fn set_extended(pose: &mut [Landmark], finger: Finger, extended: bool) {
    let joint = pose[finger.reference_joint().index()];
    let tip = &mut pose[finger.tip().index()];
    match (finger, extended) {
        (Finger::Thumb, true) => tip.x = joint.x + 0.1,
        (Finger::Thumb, false) => tip.x = joint.x - 0.05,
        (_, true) => tip.y = joint.y - 0.2,
        (_, false) => tip.y = joint.y + 0.3,
    }
}

#[cfg(test)]
pub(crate) fn set_wrist(pose: &mut [Landmark], x: f64, y: f64, z: f64) {
    pose[HandLandmark::Wrist.index()] = Landmark::new(x, y, z);
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::landmarks::uniform_pose;

    fn pose_with(extended: [bool; FINGER_COUNT]) -> Vec<Landmark> {
        let mut pose = curled_pose();
        for (finger, ext) in Finger::ALL.iter().zip(extended) {
            set_extended(&mut pose, *finger, ext);
        }
        pose
    }

    fn assert_result(result: Classification, label: &str, confidence: f32) {
        assert_eq!(result.label(), label, "got {:?}", result);
        assert!(
            (result.confidence - confidence).abs() < 1e-6,
            "expected confidence {confidence}, got {:?}",
            result,
        );
    }

    // ── Validation ──────────────────────────────────────────

    #[test]
    fn test_empty_pose_is_unknown() {
        assert_eq!(classify(&[]), Classification::unknown());
    }

    #[test]
    fn test_short_pose_is_unknown() {
        for len in 0..LANDMARK_COUNT {
            let pose = uniform_pose(0.5, 0.1, -1.0);
            let result = classify(&pose[..len]);
            assert_result(result, "unknown", 0.1);
        }
    }

    #[test]
    fn test_non_finite_pose_is_unknown() {
        let mut pose = pose_with([true; 5]);
        pose[HandLandmark::Wrist.index()].z = f64::NAN;
        assert!(classify(&pose).is_unknown());

        let mut pose = pose_with([true; 5]);
        pose[HandLandmark::IndexTip.index()].y = f64::NEG_INFINITY;
        assert!(classify(&pose).is_unknown());
        assert!(GestureClassifier::new().evaluate(&pose).is_empty());
    }

    #[test]
    fn test_extra_landmarks_ignored() {
        let mut pose = pose_with([true; 5]);
        let expected = classify(&pose);
        pose.push(Landmark::new(f64::NAN, f64::NAN, f64::NAN));
        assert_eq!(classify(&pose), expected);
    }

    #[test]
    fn test_out_of_range_coordinates_pass_through() {
        let mut pose = pose_with([false; 5]);
        set_wrist(&mut pose, 5.0, -3.0, 2.0);
        // wrist.y < 0.3 so thank_you matches at 0.7; more and no do not apply.
        assert_result(classify(&pose), "thank_you", 0.7);
    }

    // ── Feature extraction ──────────────────────────────────

    #[test]
    fn test_extended_fingers_all_true() {
        let mut pose = uniform_pose(0.5, 0.5, 0.0);
        for finger in Finger::ALL {
            pose[finger.tip().index()] = Landmark::new(0.6, 0.0, 0.0);
            pose[finger.reference_joint().index()] = Landmark::new(0.4, 1.0, 0.0);
        }
        assert_eq!(extended_fingers(&pose), Some([true; 5]));
    }

    #[test]
    fn test_extended_fingers_short_pose() {
        assert_eq!(extended_fingers(&uniform_pose(0.5, 0.5, 0.0)[..20]), None);
    }

    #[test]
    fn test_extended_fingers_thumb_uses_x() {
        let mut pose = uniform_pose(0.5, 0.5, 0.0);
        // Thumb tip far above its joint but to the left: not extended.
        pose[HandLandmark::ThumbTip.index()] = Landmark::new(0.4, 0.0, 0.0);
        pose[HandLandmark::ThumbIp.index()] = Landmark::new(0.5, 1.0, 0.0);
        assert_eq!(extended_fingers(&pose), Some([false; 5]));
    }

    #[test]
    fn test_extended_fingers_equal_is_not_extended() {
        let pose = uniform_pose(0.5, 0.5, 0.0);
        assert_eq!(extended_fingers(&pose), Some([false; 5]));
    }

    #[test]
    fn test_curled_pose_helper() {
        assert_eq!(extended_fingers(&curled_pose()), Some([false; 5]));
        let pose = pose_with([true, false, true, false, true]);
        assert_eq!(extended_fingers(&pose), Some([true, false, true, false, true]));
    }

    // ── Scenarios ───────────────────────────────────────────

    #[test]
    fn test_hello_detection() {
        let mut pose = uniform_pose(0.5, 0.5, 0.0);
        for (i, finger) in Finger::ALL.iter().enumerate() {
            let x = 0.2 * i as f64;
            pose[finger.tip().index()] = Landmark::new(x + 0.1, 0.0, 0.0);
            pose[finger.reference_joint().index()] = Landmark::new(x, 1.0, 0.0);
        }
        assert_result(classify(&pose), "hello", 0.8);
    }

    #[test]
    fn test_hello_four_fingers() {
        let pose = pose_with([false, true, true, true, true]);
        assert_result(classify(&pose), "hello", 0.8);
    }

    #[test]
    fn test_yes_detection() {
        let pose = pose_with([true, false, false, false, false]);
        assert_result(classify(&pose), "yes", 0.8);
    }

    #[test]
    fn test_no_detection() {
        let pose = pose_with([false, true, false, false, false]);
        assert_result(classify(&pose), "no", 0.7);
    }

    #[test]
    fn test_stop_detection() {
        // Three non-thumb fingers: hello needs four, stop beats finished.
        let pose = pose_with([false, true, true, true, false]);
        assert_result(classify(&pose), "stop", 0.7);
    }

    #[test]
    fn test_thank_you_detection() {
        let mut pose = pose_with([false, false, true, false, false]);
        set_wrist(&mut pose, 0.5, 0.2, 0.0);
        assert_result(classify(&pose), "thank_you", 0.7);
    }

    #[test]
    fn test_water_detection() {
        let mut pose = pose_with([false, false, true, true, false]);
        set_wrist(&mut pose, 0.5, 0.35, 0.0);
        assert_result(classify(&pose), "water", 0.6);
    }

    #[test]
    fn test_help_detection() {
        // Thumb, index and pinky: not enough non-thumb fingers for stop.
        let mut pose = pose_with([true, true, false, false, true]);
        set_wrist(&mut pose, 0.5, 0.8, -0.1);
        assert_result(classify(&pose), "help", 0.6);
    }

    #[test]
    fn test_please_detection() {
        let mut pose = pose_with([true, true, false, false, true]);
        set_wrist(&mut pose, 0.5, 0.5, 0.1);
        assert_result(classify(&pose), "please", 0.6);
    }

    #[test]
    fn test_finished_detection() {
        let mut pose = pose_with([true, true, false, false, true]);
        set_wrist(&mut pose, 0.5, 0.8, 0.1);
        assert_result(classify(&pose), "finished", 0.5);
    }

    #[test]
    fn test_more_detection() {
        let mut pose = curled_pose();
        let offsets = [(0.02, 0.0), (0.0, 0.02), (-0.02, 0.0), (0.0, -0.02), (0.01, 0.01)];
        for (finger, (dx, dy)) in Finger::ALL.iter().zip(offsets) {
            pose[finger.tip().index()] = Landmark::new(0.5 + dx, 0.5 + dy, 0.0);
            // Joints above and to the right keep every finger curled.
            pose[finger.reference_joint().index()] = Landmark::new(0.6, 0.4, 0.0);
        }
        assert_eq!(extended_fingers(&pose), Some([false; 5]));
        assert_result(classify(&pose), "more", 0.7);
    }

    #[test]
    fn test_more_rejects_single_outlier() {
        let mut pose = curled_pose();
        // Four tips bunched together, the pinky 0.5 away from them.
        for finger in &Finger::ALL[..4] {
            pose[finger.tip().index()] = Landmark::new(0.0, 0.9, 0.0);
        }
        pose[HandLandmark::PinkyTip.index()] = Landmark::new(0.5, 0.9, 0.0);
        assert_eq!(check_more(&pose), MISS);

        pose[HandLandmark::PinkyTip.index()] = Landmark::new(0.05, 0.9, 0.0);
        assert_eq!(check_more(&pose), 0.7);
    }

    // ── Threshold edges ─────────────────────────────────────

    #[test]
    fn test_thank_you_edge() {
        let mut pose = curled_pose();
        set_wrist(&mut pose, 0.5, 0.3, 0.0);
        assert_eq!(check_thank_you(&pose), MISS);
        set_wrist(&mut pose, 0.5, 0.29999999999, 0.0);
        assert_eq!(check_thank_you(&pose), 0.7);
    }

    #[test]
    fn test_please_edges() {
        let mut pose = pose_with([true, true, false, false, true]);
        set_wrist(&mut pose, 0.5, 0.3, 0.1);
        assert_eq!(check_please(&pose), MISS);
        set_wrist(&mut pose, 0.5, 0.7, 0.1);
        assert_eq!(check_please(&pose), MISS);
        set_wrist(&mut pose, 0.5, 0.30000000001, 0.1);
        assert_eq!(check_please(&pose), 0.6);
        set_wrist(&mut pose, 0.5, 0.69999999999, 0.1);
        assert_eq!(check_please(&pose), 0.6);
    }

    #[test]
    fn test_water_edge() {
        let mut pose = pose_with([false, false, true, true, false]);
        set_wrist(&mut pose, 0.5, 0.4, 0.0);
        assert_eq!(check_water(&pose), MISS);
        set_wrist(&mut pose, 0.5, 0.39999999999, 0.0);
        assert_eq!(check_water(&pose), 0.6);
    }

    #[test]
    fn test_help_edge() {
        let mut pose = pose_with([true, true, false, false, true]);
        set_wrist(&mut pose, 0.5, 0.8, 0.0);
        assert_eq!(check_help(&pose), MISS);
        set_wrist(&mut pose, 0.5, 0.8, -0.000000001);
        assert_eq!(check_help(&pose), 0.6);
    }

    #[test]
    fn test_more_edge() {
        let mut pose = curled_pose();
        // Centroid lands on (0, 0.5); thumb and index sit exactly 0.1 away.
        let xs = [0.1, -0.1, 0.0, 0.0, 0.0];
        for (finger, x) in Finger::ALL.iter().zip(xs) {
            pose[finger.tip().index()] = Landmark::new(x, 0.5, 0.0);
        }
        assert_eq!(check_more(&pose), MISS);

        let xs = [0.09, -0.09, 0.0, 0.0, 0.0];
        for (finger, x) in Finger::ALL.iter().zip(xs) {
            pose[finger.tip().index()] = Landmark::new(x, 0.5, 0.0);
        }
        assert_eq!(check_more(&pose), 0.7);
    }

    #[test]
    fn test_parsed_coordinate_near_threshold() {
        let mut pose = curled_pose();
        set_wrist(&mut pose, 0.5, 0.29999999999, 0.0);
        let body: Vec<String> = pose
            .iter()
            .map(|l| format!("({} {} {})", l.x, l.y, l.z))
            .collect();
        let parsed =
            crate::sign::landmarks::parse_landmarks_str(&format!("({})", body.join(" "))).unwrap();
        assert_eq!(parsed, pose);
        // thank_you (0.7) beats water (0.6).
        assert_result(classify(&parsed), "thank_you", 0.7);
    }

    #[test]
    fn test_all_curled_mid_frame_is_weak() {
        // Nothing matches: every rule reports MISS, first rule wins the tie.
        let pose = curled_pose();
        let scores = GestureClassifier::new().evaluate(&pose);
        assert!(scores.iter().all(|(_, c)| *c == MISS), "{:?}", scores);
        assert_result(classify(&pose), "hello", 0.2);
    }

    // ── Selection policy ────────────────────────────────────

    #[test]
    fn test_tie_keeps_first_rule() {
        // thank_you (0.7) and no (0.7) both match; thank_you is earlier.
        let mut pose = pose_with([false, true, false, false, false]);
        set_wrist(&mut pose, 0.5, 0.1, 0.0);
        assert_result(classify(&pose), "thank_you", 0.7);
    }

    #[test]
    fn test_open_hand_prefers_hello_over_overlaps() {
        let mut pose = pose_with([true; 5]);
        set_wrist(&mut pose, 0.5, 0.5, -0.2);
        let scores = GestureClassifier::new().evaluate(&pose);
        let matched: Vec<&str> = scores
            .iter()
            .filter(|(_, c)| *c > MISS)
            .map(|(g, _)| g.as_str())
            .collect();
        assert_eq!(matched, vec!["hello", "help", "stop", "please", "finished"]);
        assert_result(classify(&pose), "hello", 0.8);
    }

    fn always_half(_: &[Landmark]) -> f32 {
        0.5
    }

    fn always_certain(_: &[Landmark]) -> f32 {
        1.0
    }

    fn always_floor(_: &[Landmark]) -> f32 {
        CONFIDENCE_FLOOR
    }

    #[test]
    fn test_confidence_capped() {
        static GREEDY: [GestureRule; 2] = [
            GestureRule::new(SignGesture::Yes, always_half),
            GestureRule::new(SignGesture::No, always_certain),
        ];
        let classifier = GestureClassifier::with_rules(&GREEDY);
        assert_result(classifier.classify(&curled_pose()), "no", 0.95);
    }

    #[test]
    fn test_floor_not_beaten_by_low_scores() {
        static TIMID: [GestureRule; 1] = [GestureRule::new(SignGesture::Help, always_floor)];
        let classifier = GestureClassifier::with_rules(&TIMID);
        assert!(classifier.classify(&curled_pose()).is_unknown());
    }

    #[test]
    fn test_confidence_bounds_over_many_poses() {
        // Deterministic LCG over a wide coordinate range.
        let mut seed: u32 = 0x2545_f491;
        let mut next = || {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (seed >> 8) as f64 / (1u32 << 24) as f64 * 1.6 - 0.3
        };
        for _ in 0..500 {
            let pose: Vec<Landmark> = (0..LANDMARK_COUNT)
                .map(|_| Landmark::new(next(), next(), next()))
                .collect();
            let result = classify(&pose);
            assert!(
                (CONFIDENCE_FLOOR..=CONFIDENCE_CAP).contains(&result.confidence),
                "{:?}",
                result,
            );
            assert_eq!(classify(&pose), result, "classification must be deterministic");
        }
    }

    #[test]
    fn test_evaluate_order_matches_bank() {
        let scores = GestureClassifier::new().evaluate(&curled_pose());
        let names: Vec<SignGesture> = scores.iter().map(|(g, _)| *g).collect();
        assert_eq!(names, SignGesture::ALL.to_vec());
    }

    #[test]
    fn test_concurrent_classification() {
        let pose = pose_with([true, false, false, false, false]);
        let classifier = GestureClassifier::new();
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| classifier.classify(&pose)))
                .collect();
            for handle in handles {
                assert_result(handle.join().unwrap(), "yes", 0.8);
            }
        });
    }

    // ── Names ───────────────────────────────────────────────

    #[test]
    fn test_gesture_as_str() {
        assert_eq!(SignGesture::Hello.as_str(), "hello");
        assert_eq!(SignGesture::ThankYou.as_str(), "thank_you");
        assert_eq!(SignGesture::Finished.as_str(), "finished");
    }

    #[test]
    fn test_supported_gestures() {
        let names = supported_gestures();
        assert_eq!(names.len(), 10);
        assert_eq!(names[0], "hello");
        assert_eq!(names[9], "finished");
        assert_eq!(GestureClassifier::new().rule_count(), 10);
        let bank: Vec<SignGesture> = GestureClassifier::new().gestures().collect();
        assert_eq!(bank, SignGesture::ALL.to_vec());
    }
}
