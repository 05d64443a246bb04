//! Declarative action schemas and the parameter validator.
//!
//! Each action type maps to a table of field specs (required fields,
//! nested shapes, primitive types, length caps, numeric ranges, enums).
//! The validator walks the table recursively and produces a structured
//! report. It is pure and stateless; coordinate bounds live in a separate
//! helper so callers can apply configured world limits.

use serde_json::Value;

use crate::domain::models::action::{Action, ActionType};
use crate::domain::models::config::{WorldBounds, DEFAULT_DANGEROUS_BLOCKS};
use crate::domain::ports::client_driver::Face;

/// Outcome of a schema or coordinate validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ValidationReport) {
        self.valid = self.valid && other.valid;
        self.errors.extend(other.errors);
    }
}

/// Shape of one parameter value.
#[derive(Debug, Clone, Copy)]
enum ValueSpec {
    /// JSON object with the given fields.
    Object(&'static [FieldSpec]),
    /// JSON array of homogeneous items with length bounds.
    Array {
        item: &'static ValueSpec,
        min_len: usize,
        max_len: usize,
    },
    /// String with character-count bounds.
    Str { min: usize, max: usize },
    /// Finite number.
    Num,
    /// Integer within bounds.
    Int { min: i64, max: i64 },
    /// String drawn from a closed set.
    OneOf(&'static [&'static str]),
}

/// One named field in an object spec.
#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    required: bool,
    spec: ValueSpec,
}

const fn req(name: &'static str, spec: ValueSpec) -> FieldSpec {
    FieldSpec {
        name,
        required: true,
        spec,
    }
}

const fn opt(name: &'static str, spec: ValueSpec) -> FieldSpec {
    FieldSpec {
        name,
        required: false,
        spec,
    }
}

const VEC3_FIELDS: &[FieldSpec] = &[
    req("x", ValueSpec::Num),
    req("y", ValueSpec::Num),
    req("z", ValueSpec::Num),
];
const VEC3: ValueSpec = ValueSpec::Object(VEC3_FIELDS);

const NAME_32: ValueSpec = ValueSpec::Str { min: 1, max: 32 };
const HANDS: &[&str] = &["left", "right"];

const MOVE_TO: &[FieldSpec] = &[req("target", VEC3)];
const NAVIGATE: &[FieldSpec] = &[req(
    "waypoints",
    ValueSpec::Array {
        item: &VEC3,
        min_len: 1,
        max_len: 50,
    },
)];
const FOLLOW_TARGET: &[FieldSpec] = &[req("entity", NAME_32)];
const FOLLOW: &[FieldSpec] = &[req("target", ValueSpec::Object(FOLLOW_TARGET))];
const MINE_BLOCK: &[FieldSpec] = &[req("target", VEC3), opt("blockType", NAME_32)];
const PLACE_BLOCK: &[FieldSpec] = &[
    req("target", VEC3),
    req("blockType", NAME_32),
    opt("face", ValueSpec::OneOf(&Face::NAMES)),
];
const INTERACT: &[FieldSpec] = &[req("target", VEC3), opt("hand", ValueSpec::OneOf(HANDS))];
const USE_ITEM: &[FieldSpec] = &[req("itemName", NAME_32), opt("target", VEC3)];
const LOOK_AT: &[FieldSpec] = &[req("target", VEC3)];
const CHAT: &[FieldSpec] = &[req("message", ValueSpec::Str { min: 1, max: 256 })];
const GET_INVENTORY: &[FieldSpec] = &[];
const EQUIP_ITEM: &[FieldSpec] = &[req("itemName", NAME_32), opt("slot", ValueSpec::Int { min: 0, max: 8 })];
const DROP_ITEM: &[FieldSpec] = &[
    req("slot", ValueSpec::Int { min: 0, max: 8 }),
    opt("count", ValueSpec::Int { min: 1, max: 64 }),
];

/// Declarative parameter table for an action type.
fn schema_for(action_type: ActionType) -> &'static [FieldSpec] {
    match action_type {
        ActionType::MoveTo => MOVE_TO,
        ActionType::Navigate => NAVIGATE,
        ActionType::Follow => FOLLOW,
        ActionType::MineBlock => MINE_BLOCK,
        ActionType::PlaceBlock => PLACE_BLOCK,
        ActionType::Interact => INTERACT,
        ActionType::UseItem => USE_ITEM,
        ActionType::LookAt => LOOK_AT,
        ActionType::Chat => CHAT,
        ActionType::GetInventory => GET_INVENTORY,
        ActionType::EquipItem => EQUIP_ITEM,
        ActionType::DropItem => DROP_ITEM,
    }
}

/// Validate an action's parameter document against its type's schema.
pub fn validate_action(action: &Action) -> ValidationReport {
    let mut errors = Vec::new();

    if action.agent_id.trim().is_empty() {
        errors.push("agent_id must not be empty".to_string());
    }

    let schema = schema_for(action.action_type);
    match &action.params {
        // Empty params are fine for parameterless actions.
        Value::Null if schema.is_empty() => {}
        Value::Null => errors.push("params: expected object, got null".to_string()),
        value => walk_object("params", schema, value, &mut errors),
    }

    ValidationReport::from_errors(errors)
}

fn walk_object(path: &str, fields: &[FieldSpec], value: &Value, errors: &mut Vec<String>) {
    let Some(map) = value.as_object() else {
        errors.push(format!("{path}: expected object"));
        return;
    };
    for field in fields {
        let child_path = format!("{path}.{}", field.name);
        match map.get(field.name) {
            None | Some(Value::Null) => {
                if field.required {
                    errors.push(format!("missing required field '{child_path}'"));
                }
            }
            Some(child) => walk_value(&child_path, &field.spec, child, errors),
        }
    }
}

fn walk_value(path: &str, spec: &ValueSpec, value: &Value, errors: &mut Vec<String>) {
    match spec {
        ValueSpec::Object(fields) => walk_object(path, fields, value, errors),
        ValueSpec::Array {
            item,
            min_len,
            max_len,
        } => {
            let Some(items) = value.as_array() else {
                errors.push(format!("{path}: expected array"));
                return;
            };
            if items.len() < *min_len || items.len() > *max_len {
                errors.push(format!(
                    "{path}: length {} outside [{min_len}, {max_len}]",
                    items.len()
                ));
            }
            for (i, item_value) in items.iter().enumerate() {
                walk_value(&format!("{path}[{i}]"), item, item_value, errors);
            }
        }
        ValueSpec::Str { min, max } => {
            let Some(s) = value.as_str() else {
                errors.push(format!("{path}: expected string"));
                return;
            };
            let len = s.chars().count();
            if len < *min || len > *max {
                errors.push(format!("{path}: length {len} outside [{min}, {max}]"));
            }
        }
        ValueSpec::Num => match value.as_f64() {
            Some(n) if n.is_finite() => {}
            _ => errors.push(format!("{path}: expected finite number")),
        },
        ValueSpec::Int { min, max } => {
            let Some(n) = value.as_i64() else {
                errors.push(format!("{path}: expected integer"));
                return;
            };
            if n < *min || n > *max {
                errors.push(format!("{path}: {n} outside [{min}, {max}]"));
            }
        }
        ValueSpec::OneOf(choices) => {
            let Some(s) = value.as_str() else {
                errors.push(format!("{path}: expected string"));
                return;
            };
            if !choices.contains(&s) {
                errors.push(format!("{path}: '{s}' not one of {choices:?}"));
            }
        }
    }
}

/// Check a single coordinate triple against world bounds.
pub fn validate_coordinates(bounds: &WorldBounds, x: f64, y: f64, z: f64) -> ValidationReport {
    let mut errors = Vec::new();
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        errors.push("coordinates must be finite".to_string());
    } else if !bounds.contains(x, y, z) {
        errors.push(format!(
            "({x}, {y}, {z}) outside world bounds x,z ∈ [{}, {}], y ∈ [{}, {}]",
            bounds.xz_min, bounds.xz_max, bounds.y_min, bounds.y_max
        ));
    }
    ValidationReport::from_errors(errors)
}

/// Check every coordinate an action carries (`target`, `waypoints`).
pub fn validate_action_coordinates(bounds: &WorldBounds, action: &Action) -> ValidationReport {
    let mut report = ValidationReport::ok();
    if let Some(target) = action.params.get("target") {
        if let Some((x, y, z)) = as_triple(target) {
            report.merge(validate_coordinates(bounds, x, y, z));
        }
    }
    if let Some(waypoints) = action.params.get("waypoints").and_then(Value::as_array) {
        for waypoint in waypoints {
            if let Some((x, y, z)) = as_triple(waypoint) {
                report.merge(validate_coordinates(bounds, x, y, z));
            }
        }
    }
    report
}

fn as_triple(value: &Value) -> Option<(f64, f64, f64)> {
    Some((
        value.get("x")?.as_f64()?,
        value.get("y")?.as_f64()?,
        value.get("z")?.as_f64()?,
    ))
}

/// Whether a block type is safe to touch (not on the server-breaking
/// blacklist).
pub fn safe_block_type(name: &str) -> bool {
    !DEFAULT_DANGEROUS_BLOCKS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn action(ty: ActionType, params: Value) -> Action {
        Action::new(ty, "agent-1", params)
    }

    #[test]
    fn test_move_to_valid() {
        let report = validate_action(&action(
            ActionType::MoveTo,
            json!({"target": {"x": 1.0, "y": 64.0, "z": -2.5}}),
        ));
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_missing_required_field() {
        let report = validate_action(&action(ActionType::MoveTo, json!({})));
        assert!(!report.valid);
        assert!(report.errors[0].contains("params.target"));
    }

    #[test]
    fn test_wrong_primitive_type() {
        let report = validate_action(&action(
            ActionType::MoveTo,
            json!({"target": {"x": "ten", "y": 64, "z": 0}}),
        ));
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("expected finite number")));
    }

    #[test]
    fn test_chat_length_caps() {
        assert!(!validate_action(&action(ActionType::Chat, json!({"message": ""}))).valid);
        assert!(validate_action(&action(ActionType::Chat, json!({"message": "hi"}))).valid);
        let long = "x".repeat(257);
        assert!(!validate_action(&action(ActionType::Chat, json!({ "message": long }))).valid);
    }

    #[test]
    fn test_navigate_waypoint_bounds() {
        let one = json!({"waypoints": [{"x": 0, "y": 64, "z": 0}]});
        assert!(validate_action(&action(ActionType::Navigate, one)).valid);

        let empty = json!({"waypoints": []});
        assert!(!validate_action(&action(ActionType::Navigate, empty)).valid);

        let many: Vec<Value> = (0..51).map(|i| json!({"x": i, "y": 64, "z": 0})).collect();
        assert!(!validate_action(&action(ActionType::Navigate, json!({ "waypoints": many }))).valid);
    }

    #[test]
    fn test_place_block_face_enum() {
        let good = json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "stone", "face": "top"});
        assert!(validate_action(&action(ActionType::PlaceBlock, good)).valid);

        let bad = json!({"target": {"x": 0, "y": 64, "z": 0}, "blockType": "stone", "face": "up"});
        let report = validate_action(&action(ActionType::PlaceBlock, bad));
        assert!(!report.valid);
        assert!(report.errors[0].contains("not one of"));
    }

    #[test]
    fn test_drop_item_integer_ranges() {
        assert!(validate_action(&action(ActionType::DropItem, json!({"slot": 8, "count": 64}))).valid);
        assert!(!validate_action(&action(ActionType::DropItem, json!({"slot": 9}))).valid);
        assert!(!validate_action(&action(ActionType::DropItem, json!({"slot": 0, "count": 0}))).valid);
        assert!(!validate_action(&action(ActionType::DropItem, json!({"slot": 2.5}))).valid);
    }

    #[test]
    fn test_get_inventory_accepts_null_params() {
        let mut a = action(ActionType::GetInventory, Value::Null);
        assert!(validate_action(&a).valid);
        a.params = json!({});
        assert!(validate_action(&a).valid);
    }

    #[test]
    fn test_empty_agent_id_rejected() {
        let mut a = action(ActionType::Chat, json!({"message": "hi"}));
        a.agent_id = String::new();
        assert!(!validate_action(&a).valid);
    }

    #[test]
    fn test_coordinate_bounds() {
        let bounds = WorldBounds::default();
        assert!(validate_coordinates(&bounds, 0.0, 64.0, 0.0).valid);
        assert!(!validate_coordinates(&bounds, 30_000_001.0, 64.0, 0.0).valid);
        assert!(!validate_coordinates(&bounds, 0.0, 320.0, 0.0).valid);
        assert!(!validate_coordinates(&bounds, 0.0, f64::NAN, 0.0).valid);
    }

    #[test]
    fn test_action_coordinates_checks_waypoints() {
        let bounds = WorldBounds::default();
        let a = action(
            ActionType::Navigate,
            json!({"waypoints": [{"x": 0, "y": 64, "z": 0}, {"x": 0, "y": 500, "z": 0}]}),
        );
        assert!(!validate_action_coordinates(&bounds, &a).valid);
    }

    #[test]
    fn test_safe_block_type() {
        assert!(safe_block_type("coal_ore"));
        assert!(!safe_block_type("tnt"));
        assert!(!safe_block_type("command_block"));
        assert!(!safe_block_type("bedrock"));
    }

    fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<f64>().prop_map(|n| serde_json::Number::from_f64(n)
                .map_or(Value::Null, Value::Number)),
            any::<i64>().prop_map(|n| Value::Number(n.into())),
            "[a-z0-9_]{0,40}".prop_map(Value::String),
        ];
        leaf.prop_recursive(depth, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
                prop::collection::hash_map("[a-z_]{1,12}", inner, 0..8).prop_map(|m| {
                    Value::Object(m.into_iter().collect())
                }),
            ]
        })
    }

    proptest! {
        // The validator must reject or accept, never panic, on any document.
        #[test]
        fn prop_validator_total(ty in prop::sample::select(ActionType::ALL.to_vec()), params in arb_json(3)) {
            let a = Action::new(ty, "agent-1", params);
            let report = validate_action(&a);
            prop_assert_eq!(report.valid, report.errors.is_empty());
        }

        #[test]
        fn prop_valid_move_to_accepted(x in -1000.0f64..1000.0, y in -64.0f64..319.0, z in -1000.0f64..1000.0) {
            let a = Action::new(ActionType::MoveTo, "agent-1", json!({"target": {"x": x, "y": y, "z": z}}));
            prop_assert!(validate_action(&a).valid);
            prop_assert!(validate_action_coordinates(&WorldBounds::default(), &a).valid);
        }
    }
}
