//! IPC message dispatch: parse s-expressions and route to handlers.

use lexpr::Value;
use tracing::{debug, warn};

use super::server::IpcServer;
use crate::history::{EntryKind, DEFAULT_LIST_LIMIT};
use crate::sign::landmarks::parse_landmarks;
use crate::sign::{extended_fingers, Finger, Hand, Landmark, LANDMARK_COUNT};
use crate::state::SignBridgeState;

/// Protocol version spoken by this server.
pub const PROTOCOL_VERSION: i64 = 1;

/// Service name reported by hello and health.
pub const SERVICE_NAME: &str = "signbridge";

/// Confidence recorded for a supported text-to-sign lookup.
const LOOKUP_SUPPORTED_CONFIDENCE: f32 = 0.9;

/// Confidence recorded for an unsupported text-to-sign lookup.
const LOOKUP_UNSUPPORTED_CONFIDENCE: f32 = 0.1;

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut SignBridgeState, client_id: u64, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    let is_authenticated = state
        .ipc_server
        .clients
        .get(&client_id)
        .map(|c| c.authenticated)
        .unwrap_or(false);

    match msg_type.as_deref() {
        Some("hello") => handle_hello(state, client_id, msg_id, &value),
        _ if !is_authenticated => Some(error_response(msg_id, "hello handshake required")),
        Some("ping") => handle_ping(msg_id, &value),
        Some("classify") => handle_classify(state, msg_id, &value),
        Some("classify-scores") => handle_classify_scores(state, msg_id, &value),
        Some("text-to-sign") => handle_text_to_sign(state, msg_id, &value),
        Some("conversations") => handle_conversations(state, msg_id, &value),
        Some("conversations-clear") => handle_conversations_clear(state, msg_id),
        Some("supported-signs") => handle_supported_signs(state, msg_id),
        Some("health") => handle_health(state, msg_id),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

// ── Handlers ────────────────────────────────────────────────

fn handle_hello(
    state: &mut SignBridgeState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let version = get_int(value, "version").unwrap_or(0);
    if version != PROTOCOL_VERSION {
        return Some(error_response(
            msg_id,
            &format!("unsupported protocol version: {version}"),
        ));
    }

    // Only clients running as our own user may talk to us.
    let peer = state.ipc_server.clients.get(&client_id).and_then(|c| c.peer);
    if let Some(peer) = peer {
        if !peer.is_same_user() {
            warn!(client_id, peer_uid = peer.uid, "rejecting client: UID mismatch");
            return Some(error_response(msg_id, "authentication failed: UID mismatch"));
        }
    }

    let client_name = get_string(value, "client").unwrap_or_default();
    debug!(client_id, client_name = client_name.as_str(), "hello handshake (authenticated)");

    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.authenticated = true;
        client.client_name = Some(client_name);
    }

    let pid_field = peer
        .and_then(|p| p.pid)
        .map(|p| format!(" :peer-pid {}", p))
        .unwrap_or_default();
    Some(format!(
        "(:type :hello :id {} :version {} :server \"{}\" :features (:sign-recognition t :text-to-sign t :conversation-history t){})",
        msg_id, PROTOCOL_VERSION, SERVICE_NAME, pid_field
    ))
}

fn handle_ping(msg_id: i64, value: &Value) -> Option<String> {
    let client_ts = get_int(value, "timestamp").unwrap_or(0);
    let server_ts = crate::history::unix_millis();

    Some(format!(
        "(:type :response :id {} :status :ok :client-timestamp {} :server-timestamp {})",
        msg_id, client_ts, server_ts
    ))
}

/// The `:landmarks` list of a request, or the error reason to send back.
fn request_pose(value: &Value) -> Result<Vec<Landmark>, String> {
    let landmarks = get_value(value, "landmarks").ok_or("missing :landmarks")?;
    let pose = parse_landmarks(landmarks).map_err(|e| format!("invalid landmarks: {e:#}"))?;
    if pose.is_empty() {
        return Err("no landmarks provided".to_string());
    }
    Ok(pose)
}

fn handle_classify(state: &mut SignBridgeState, msg_id: i64, value: &Value) -> Option<String> {
    let pose = match request_pose(value) {
        Ok(p) => p,
        Err(reason) => return Some(error_response(msg_id, &reason)),
    };
    let hand = match get_string(value, "handedness") {
        Some(h) => match Hand::parse(&h) {
            Some(hand) => hand,
            None => return Some(error_response(msg_id, &format!("invalid :handedness {h}"))),
        },
        None => Hand::default(),
    };

    let result = state.classifier.classify(&pose);
    state.stats.classifications += 1;
    if result.is_unknown() {
        state.stats.unknown_classifications += 1;
    }
    debug!(
        landmarks = pose.len(),
        hand = hand.as_str(),
        gesture = result.label(),
        confidence = result.confidence,
        "classify request"
    );

    let entry_id = state
        .history
        .record(EntryKind::SignToText, result.label(), Some(result.confidence));
    broadcast_latest_entry(state);

    Some(format!(
        "(:type :response :id {} :status :ok :gesture \"{}\" :confidence {:.2} :handedness :{} :complete {} :entry-id {})",
        msg_id,
        result.label(),
        result.confidence,
        hand.as_str(),
        if pose.len() >= LANDMARK_COUNT { "t" } else { "nil" },
        entry_id,
    ))
}

fn handle_classify_scores(
    state: &mut SignBridgeState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let pose = match request_pose(value) {
        Ok(p) => p,
        Err(reason) => return Some(error_response(msg_id, &reason)),
    };

    let mut scores = String::from("(");
    for (i, (gesture, confidence)) in state.classifier.evaluate(&pose).iter().enumerate() {
        if i > 0 {
            scores.push(' ');
        }
        scores.push_str(&format!(
            "(:gesture \"{}\" :confidence {:.2})",
            gesture.as_str(),
            confidence
        ));
    }
    scores.push(')');

    let fingers = match extended_fingers(&pose) {
        Some(states) => {
            let fields: Vec<String> = Finger::ALL
                .iter()
                .zip(states)
                .map(|(finger, up)| format!(":{} {}", finger.as_str(), if up { "t" } else { "nil" }))
                .collect();
            format!("({})", fields.join(" "))
        }
        None => "nil".to_string(),
    };

    let result = state.classifier.classify(&pose);
    Some(format!(
        "(:type :response :id {} :status :ok :gesture \"{}\" :confidence {:.2} :scores {} :fingers {})",
        msg_id,
        result.label(),
        result.confidence,
        scores,
        fingers
    ))
}

fn handle_text_to_sign(state: &mut SignBridgeState, msg_id: i64, value: &Value) -> Option<String> {
    let text = match get_string(value, "text") {
        Some(t) => t,
        None => return Some(error_response(msg_id, "missing :text")),
    };

    let found = state.catalog.lookup(&text);
    state.stats.lookups += 1;
    let confidence = if found.supported() {
        LOOKUP_SUPPORTED_CONFIDENCE
    } else {
        state.stats.unsupported_lookups += 1;
        LOOKUP_UNSUPPORTED_CONFIDENCE
    };
    state
        .history
        .record(EntryKind::TextToSign, &text, Some(confidence));
    broadcast_latest_entry(state);

    let phrase = found
        .phrase
        .map(|p| format!("\"{}\"", p))
        .unwrap_or_else(|| "nil".to_string());
    Some(format!(
        "(:type :response :id {} :status :ok :animation-key \"{}\" :text \"{}\" :supported {} :match :{} :phrase {})",
        msg_id,
        found.animation_key,
        escape_string(&text),
        if found.supported() { "t" } else { "nil" },
        found.kind.as_str(),
        phrase,
    ))
}

fn handle_conversations(state: &mut SignBridgeState, msg_id: i64, value: &Value) -> Option<String> {
    let limit = match get_int(value, "limit") {
        Some(n) if n > 0 => n as usize,
        Some(n) => return Some(error_response(msg_id, &format!("invalid :limit {n}"))),
        None => DEFAULT_LIST_LIMIT,
    };

    let mut entries = String::from("(");
    let mut count = 0;
    for entry in state.history.recent(limit) {
        if count > 0 {
            entries.push(' ');
        }
        entries.push_str(&entry.to_sexp());
        count += 1;
    }
    entries.push(')');

    Some(format!(
        "(:type :response :id {} :status :ok :count {} :entries {})",
        msg_id, count, entries
    ))
}

fn handle_conversations_clear(state: &mut SignBridgeState, msg_id: i64) -> Option<String> {
    let cleared = state.history.clear();
    debug!(cleared, "conversation history cleared");
    Some(format!(
        "(:type :response :id {} :status :ok :cleared {})",
        msg_id, cleared
    ))
}

fn handle_supported_signs(state: &mut SignBridgeState, msg_id: i64) -> Option<String> {
    let signs: Vec<String> = state
        .classifier
        .gestures()
        .map(|g| format!("\"{}\"", g.as_str()))
        .collect();
    let phrases: Vec<String> = state
        .catalog
        .phrases()
        .map(|p| format!("\"{}\"", escape_string(p)))
        .collect();
    Some(format!(
        "(:type :response :id {} :status :ok :signs ({}) :phrases ({}) :total-signs {} :total-phrases {})",
        msg_id,
        signs.join(" "),
        phrases.join(" "),
        signs.len(),
        phrases.len(),
    ))
}

fn handle_health(state: &mut SignBridgeState, msg_id: i64) -> Option<String> {
    let stats = state.stats;
    Some(format!(
        "(:type :response :id {} :status :ok :health :healthy :service \"{}\" :version \"{}\" :timestamp {} :uptime-secs {} :features (:sign-recognition t :text-to-sign t :conversation-history t) :clients {} :history {} :classifications {} :unknown-classifications {} :lookups {} :unsupported-lookups {})",
        msg_id,
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        crate::history::unix_millis(),
        state.uptime_secs(),
        state.ipc_server.clients.len(),
        state.history.len(),
        stats.classifications,
        stats.unknown_classifications,
        stats.lookups,
        stats.unsupported_lookups,
    ))
}

/// Tell subscribed clients about the entry just recorded.
fn broadcast_latest_entry(state: &mut SignBridgeState) {
    let Some(entry) = state.history.recent(1).next() else {
        return;
    };
    let event = format_event("conversation-entry", &[("entry", &entry.to_sexp())]);
    IpcServer::broadcast_event(state, &event);
}

// ── Helpers ────────────────────────────────────────────────

pub(crate) fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Find the value following `:key` in an s-expression plist.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            return match pair.cdr() {
                Value::Cons(next) => Some(next.car()),
                _ => None,
            };
        }
        current = pair.cdr();
    }
    None
}

/// Extract a keyword value from an s-expression plist as a string.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    let val = get_value(value, key)?;
    Some(match val {
        Value::Keyword(v) => v.to_string(),
        Value::Symbol(v) => {
            let s = v.to_string();
            s.strip_prefix(':').unwrap_or(&s).to_string()
        }
        Value::String(v) => v.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => if *b { "t" } else { "nil" }.to_string(),
        Value::Null => "nil".to_string(),
        _ => val.to_string(),
    })
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract a string value from an s-expression plist.
fn get_string(value: &Value, key: &str) -> Option<String> {
    get_keyword(value, key)
}

/// Format an IPC event s-expression.
pub fn format_event(event_type: &str, fields: &[(&str, &str)]) -> String {
    let mut s = format!("(:type :event :event :{}", event_type);
    for (key, val) in fields {
        s.push_str(&format!(" :{} {}", key, val));
    }
    s.push(')');
    s
}
