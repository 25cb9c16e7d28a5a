//! Bounded rendering of JDI values into JSON.
//!
//! Depth, string length, collection and field counts are hard caps; on top of
//! those every write is metered by a [`TokenBudget`]. Overhead for a field or
//! item is reserved *before* its value is rendered, so running out of budget
//! drops whole entries instead of leaving half-rendered values.

use serde_json::{json, Map, Value as Json};

use tether_jdi::{FrameRef, JdiError, ObjectRef, ThreadRef, Value};

use crate::budget::TokenBudget;
use crate::condition::CondValue;
use crate::mapping::Mapping;
use crate::object_registry::ObjectRegistry;
use crate::rpc::RpcError;

pub const MAX_STRING_LEN: usize = 200;
pub const MAX_COLLECTION_ITEMS: usize = 10;
pub const MAX_OBJECT_FIELDS: usize = 10;
pub const MIN_DEPTH: i64 = 1;
pub const MAX_DEPTH: i64 = 3;

/// Map facade failures onto the RPC error surface.
pub fn jdi_to_rpc(err: JdiError) -> RpcError {
    match err {
        JdiError::ObjectCollected => {
            RpcError::invalid_request("ERR_OBJECT_COLLECTED: object has been garbage collected")
        }
        JdiError::ThreadNotSuspended => {
            RpcError::invalid_request("ERR_NOT_SUSPENDED: thread is not suspended")
        }
        JdiError::Disconnected => RpcError::invalid_request("VM is disconnected"),
        other => RpcError::internal(format!("debug interface failure: {other}")),
    }
}

fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len).collect();
    out.push('…');
    out
}

pub struct Inspector<'a> {
    pub budget: &'a mut TokenBudget,
    pub mapping: Option<&'a Mapping>,
    /// Allocates the stable `obj_N` handle for an object the output refers to.
    pub objects: &'a mut dyn FnMut(&ObjectRef) -> String,
}

impl Inspector<'_> {
    fn charge(&mut self, chars: usize) -> bool {
        self.budget.try_consume(chars as u64)
    }

    fn display_class(&self, raw: &str) -> String {
        match self.mapping {
            Some(mapping) => mapping.deobfuscate_type_name(raw),
            None => raw.to_string(),
        }
    }

    pub fn inspect(&mut self, value: &Value, depth: u32) -> Result<Json, RpcError> {
        match value {
            Value::Null => {
                self.charge(4);
                Ok(Json::Null)
            }
            Value::Boolean(v) => self.scalar(json!(v)),
            Value::Byte(v) => self.scalar(json!(v)),
            Value::Short(v) => self.scalar(json!(v)),
            Value::Char(v) => {
                let rendered = char::from_u32(u32::from(*v))
                    .unwrap_or('\u{FFFD}')
                    .to_string();
                self.scalar(json!(rendered))
            }
            Value::Int(v) => self.scalar(json!(v)),
            Value::Long(v) => self.scalar(json!(v)),
            Value::Float(v) => self.scalar(json!(f64::from(*v))),
            Value::Double(v) => self.scalar(json!(v)),
            Value::Text(text) => {
                let rendered = truncate_chars(text, MAX_STRING_LEN);
                if !self.charge(rendered.chars().count() + 2) {
                    return Ok(Json::Null);
                }
                Ok(json!(rendered))
            }
            Value::Array(array) => {
                let class = self.display_class(&array.type_name());
                let length = array.length().map_err(jdi_to_rpc)?;
                let shown = length.min(MAX_COLLECTION_ITEMS);
                let items = array.get_values(0, shown).map_err(jdi_to_rpc)?;
                self.render_items(class, length, &items, depth)
            }
            Value::Object(object) => self.inspect_object(object, depth),
        }
    }

    fn scalar(&mut self, value: Json) -> Result<Json, RpcError> {
        if !self.charge(value.to_string().len()) {
            return Ok(Json::Null);
        }
        Ok(value)
    }

    fn render_items(
        &mut self,
        class: String,
        length: usize,
        items: &[Value],
        depth: u32,
    ) -> Result<Json, RpcError> {
        if !self.charge(class.len() + 24) {
            return Ok(Json::Null);
        }
        let mut rendered = Vec::new();
        for item in items {
            // Per-item separator overhead, reserved before the value.
            if !self.charge(2) {
                break;
            }
            let item_json = self.inspect(item, depth.saturating_sub(1))?;
            // An item that ran out of budget mid-render is dropped whole.
            if self.budget.truncated() {
                break;
            }
            rendered.push(item_json);
        }
        Ok(json!({
            "class": class,
            "length": length,
            "items": rendered,
        }))
    }

    fn inspect_object(&mut self, object: &ObjectRef, depth: u32) -> Result<Json, RpcError> {
        let class_ref = object.reference_type().map_err(jdi_to_rpc)?;
        let raw_class = class_ref.name();
        let class = self.display_class(&raw_class);
        let handle = (self.objects)(object);

        // List-like shapes (an int `size` plus a backing array field) render
        // as collections, mirroring how arrays are shown.
        if let Some((size, backing)) = self.detect_list_like(object)? {
            let shown = size.min(MAX_COLLECTION_ITEMS);
            let items = backing.get_values(0, shown).map_err(jdi_to_rpc)?;
            return self.render_items(class, size, &items, depth);
        }

        if !self.charge(class.len() + handle.len() + 12) {
            return Ok(Json::Null);
        }

        if depth == 0 {
            return Ok(json!({ "class": class, "object_id": handle }));
        }

        let fields = class_ref.fields().map_err(jdi_to_rpc)?;
        let mut rendered = Map::new();
        for field in fields.iter().filter(|f| !f.is_static) {
            if rendered.len() >= MAX_OBJECT_FIELDS {
                break;
            }
            let display_name = self
                .mapping
                .and_then(|m| m.deobfuscate_field(&raw_class, &field.name))
                .unwrap_or(&field.name)
                .to_string();
            // Reserve the field's structural overhead before its value.
            if !self.charge(display_name.len() + 4) {
                break;
            }
            let value = object.get_value(&field.name).map_err(jdi_to_rpc)?;
            let value_json = match value {
                Some(value) => self.inspect(&value, depth - 1)?,
                None => Json::Null,
            };
            // A field whose value overran the budget is dropped whole.
            if self.budget.truncated() {
                break;
            }
            rendered.insert(display_name, value_json);
        }

        Ok(json!({
            "class": class,
            "object_id": handle,
            "fields": rendered,
        }))
    }

    fn detect_list_like(&self, object: &ObjectRef) -> Result<Option<(usize, tether_jdi::ArrayRef)>, RpcError> {
        let class_ref = object.reference_type().map_err(jdi_to_rpc)?;
        let fields = class_ref.fields().map_err(jdi_to_rpc)?;
        if !fields.iter().any(|f| f.name == "size" && !f.is_static) {
            return Ok(None);
        }
        let size = match object.get_value("size").map_err(jdi_to_rpc)? {
            Some(Value::Int(n)) if n >= 0 => n as usize,
            _ => return Ok(None),
        };
        for field in fields.iter().filter(|f| !f.is_static) {
            if let Some(Value::Array(backing)) = object.get_value(&field.name).map_err(jdi_to_rpc)? {
                return Ok(Some((size, backing)));
            }
        }
        Ok(None)
    }
}

/// Full inspection envelope: the rendered value plus budget bookkeeping.
pub fn inspect_envelope(
    value: &Value,
    depth: u32,
    budget: &mut TokenBudget,
    mapping: Option<&Mapping>,
    objects: &mut dyn FnMut(&ObjectRef) -> String,
) -> Result<Json, RpcError> {
    let mut inspector = Inspector {
        budget,
        mapping,
        objects,
    };
    inspector.inspect(value, depth)
}

// ---------------------------------------------------------------------------
// Path resolution

/// Resolve `a.b.c` against a stopped frame.
///
/// The first segment is a visible local or a previously-issued `obj_N`
/// handle; later segments are instance field reads. Field names are accepted
/// in either the on-the-wire (obfuscated) or the mapping's original form.
pub fn resolve_path(
    frame: &FrameRef,
    path: &str,
    lookup_handle: &dyn Fn(&str) -> Option<ObjectRef>,
    mapping: Option<&Mapping>,
) -> Result<Value, RpcError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return Err(RpcError::invalid_params(format!(
            "invalid variable path: {path:?}"
        )));
    }

    let first = segments[0];
    let mut current = if ObjectRegistry::is_handle(first) {
        let object = lookup_handle(first).ok_or_else(|| {
            RpcError::invalid_request(format!(
                "ERR_OBJECT_COLLECTED: stale object handle {first} (handles are invalidated on resume)"
            ))
        })?;
        Value::Object(object)
    } else {
        frame
            .get_value(first)
            .map_err(jdi_to_rpc)?
            .ok_or_else(|| {
                RpcError::invalid_request(format!("no visible variable named {first:?}"))
            })?
    };

    for segment in &segments[1..] {
        let object = match &current {
            Value::Null => {
                return Err(RpcError::invalid_request(format!(
                    "cannot read field {segment:?} of null"
                )))
            }
            Value::Object(object) => object.clone(),
            _ => {
                return Err(RpcError::invalid_request(format!(
                    "cannot read field {segment:?} of a non-object value"
                )))
            }
        };

        let raw_class = object
            .reference_type()
            .map_err(jdi_to_rpc)?
            .name();

        let mut value = object.get_value(segment).map_err(jdi_to_rpc)?;
        if value.is_none() {
            // The user may have written the original name for an obfuscated
            // field; translate and retry.
            if let Some(raw_field) =
                mapping.and_then(|m| m.obfuscate_field(&raw_class, segment))
            {
                value = object.get_value(raw_field).map_err(jdi_to_rpc)?;
            }
        }
        current = value.ok_or_else(|| {
            RpcError::invalid_request(format!("no field {segment:?} on {raw_class}"))
        })?;
    }

    Ok(current)
}

/// Lower a JDI value into the condition evaluator's domain.
pub fn to_cond_value(value: &Value) -> CondValue {
    match value {
        Value::Null => CondValue::Null,
        Value::Boolean(b) => CondValue::Bool(*b),
        Value::Byte(v) => CondValue::Number(f64::from(*v)),
        Value::Short(v) => CondValue::Number(f64::from(*v)),
        Value::Char(v) => CondValue::Number(f64::from(*v)),
        Value::Int(v) => CondValue::Number(f64::from(*v)),
        Value::Long(v) => CondValue::Number(*v as f64),
        Value::Float(v) => CondValue::Number(f64::from(*v)),
        Value::Double(v) => CondValue::Number(*v),
        Value::Text(s) => CondValue::Text(s.clone()),
        Value::Array(a) => CondValue::Object(Some(a.type_name())),
        Value::Object(o) => {
            CondValue::Object(o.reference_type().ok().map(|c| c.name()))
        }
    }
}

/// Plain-text rendering used by logpoint placeholders and `toString`
/// fallbacks.
pub fn render_to_string(value: &Value, mapping: Option<&Mapping>) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Byte(v) => v.to_string(),
        Value::Short(v) => v.to_string(),
        Value::Char(v) => char::from_u32(u32::from(*v)).unwrap_or('\u{FFFD}').to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Text(s) => truncate_chars(s, MAX_STRING_LEN),
        Value::Array(a) => {
            let class = match mapping {
                Some(m) => m.deobfuscate_type_name(&a.type_name()),
                None => a.type_name(),
            };
            match a.length() {
                Ok(len) => format!("{class}[{len}]"),
                Err(_) => format!("{class}[?]"),
            }
        }
        Value::Object(o) => {
            let class = o
                .reference_type()
                .map(|c| c.name())
                .unwrap_or_else(|_| "<collected>".to_string());
            let class = match mapping {
                Some(m) => m.deobfuscate_type_name(&class),
                None => class,
            };
            format!("{class}@0x{:x}", o.unique_id())
        }
    }
}

// ---------------------------------------------------------------------------
// evaluate

/// `evaluate` endpoint semantics: a bare path inspects at depth 1, a
/// `path.toString()` suffix invokes the target's `toString` on the stopped
/// thread. Anything else (parentheses, arithmetic) is unsupported.
pub fn evaluate_expression(
    frame: &FrameRef,
    thread: &ThreadRef,
    expression: &str,
    budget: &mut TokenBudget,
    lookup_handle: &dyn Fn(&str) -> Option<ObjectRef>,
    mapping: Option<&Mapping>,
    objects: &mut dyn FnMut(&ObjectRef) -> String,
) -> Result<Json, RpcError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(RpcError::invalid_params("expression must not be empty"));
    }

    if let Some(base) = expression.strip_suffix(".toString()") {
        if base.is_empty() || base.contains('(') || base.contains(')') {
            return Err(RpcError::invalid_params(format!(
                "ERR_EVAL_UNSUPPORTED: cannot evaluate {expression:?}; only variable paths and path.toString() are supported"
            )));
        }
        let value = resolve_path(frame, base, lookup_handle, mapping)?;
        let rendered = match &value {
            Value::Object(object) => match object.invoke_to_string(thread).map_err(jdi_to_rpc)? {
                Some(text) => truncate_chars(&text, MAX_STRING_LEN),
                None => render_to_string(&value, mapping),
            },
            other => render_to_string(other, mapping),
        };
        budget.try_consume(rendered.chars().count() as u64);
        return Ok(json!(rendered));
    }

    if expression.contains('(') || expression.contains(')') {
        return Err(RpcError::invalid_params(format!(
            "ERR_EVAL_UNSUPPORTED: cannot evaluate {expression:?}; only variable paths and path.toString() are supported"
        )));
    }

    let value = resolve_path(frame, expression, lookup_handle, mapping)?;
    let mut inspector = Inspector {
        budget,
        mapping,
        objects,
    };
    inspector.inspect(&value, 1)
}

#[cfg(test)]
mod tests {
    use tether_jdi::fake::{FakeArray, FakeObject};

    use super::*;

    fn no_mapping_inspect(value: &Value, depth: u32) -> (Json, bool, u64) {
        let mut budget = TokenBudget::default();
        let mut registry = ObjectRegistry::new();
        let mut objects = |object: &ObjectRef| registry_handle(&mut registry, object);
        let rendered =
            inspect_envelope(value, depth, &mut budget, None, &mut objects).unwrap();
        (rendered, budget.truncated(), budget.token_usage_estimate())
    }

    fn registry_handle(registry: &mut ObjectRegistry, object: &ObjectRef) -> String {
        registry.handle_for(object)
    }

    #[test]
    fn scalars_render_as_json_scalars() {
        assert_eq!(no_mapping_inspect(&Value::Int(42), 1).0, json!(42));
        assert_eq!(no_mapping_inspect(&Value::Boolean(true), 1).0, json!(true));
        assert_eq!(no_mapping_inspect(&Value::Char(65), 1).0, json!("A"));
        assert_eq!(no_mapping_inspect(&Value::Null, 1).0, Json::Null);
    }

    #[test]
    fn long_strings_are_capped() {
        let long = "x".repeat(400);
        let (rendered, _, _) = no_mapping_inspect(&Value::Text(long), 1);
        let text = rendered.as_str().unwrap();
        assert_eq!(text.chars().count(), MAX_STRING_LEN + 1);
        assert!(text.ends_with('…'));
    }

    #[test]
    fn objects_at_depth_zero_are_references_only() {
        let object: ObjectRef = FakeObject::of("com.example.Helper")
            .field("seed", Value::Int(7))
            .build();
        let (rendered, _, _) = no_mapping_inspect(&Value::Object(object), 0);
        assert_eq!(rendered["class"], "com.example.Helper");
        assert!(rendered["object_id"].as_str().unwrap().starts_with("obj_"));
        assert!(rendered.get("fields").is_none());
    }

    #[test]
    fn objects_at_depth_one_render_fields() {
        let object: ObjectRef = FakeObject::of("com.example.Helper")
            .field("seed", Value::Int(7))
            .field("name", Value::Text("bob".to_string()))
            .static_field("MAX", Value::Int(99))
            .build();
        let (rendered, _, _) = no_mapping_inspect(&Value::Object(object), 1);
        assert_eq!(rendered["fields"]["seed"], json!(7));
        assert_eq!(rendered["fields"]["name"], json!("bob"));
        // Static fields never show up.
        assert!(rendered["fields"].get("MAX").is_none());
    }

    #[test]
    fn arrays_render_length_and_items() {
        let array = FakeArray::new(
            "int[]",
            (0..25).map(Value::Int).collect(),
        );
        let (rendered, _, _) = no_mapping_inspect(&Value::Array(array), 1);
        assert_eq!(rendered["class"], "int[]");
        assert_eq!(rendered["length"], 25);
        assert_eq!(rendered["items"].as_array().unwrap().len(), MAX_COLLECTION_ITEMS);
    }

    #[test]
    fn list_like_objects_render_backing_array() {
        let backing = FakeArray::new(
            "java.lang.Object[]",
            vec![
                Value::Text("a".to_string()),
                Value::Text("b".to_string()),
                Value::Null,
                Value::Null,
            ],
        );
        let list: ObjectRef = FakeObject::of("java.util.ArrayList")
            .field("size", Value::Int(2))
            .field("elementData", Value::Array(backing))
            .build();
        let (rendered, _, _) = no_mapping_inspect(&Value::Object(list), 1);
        assert_eq!(rendered["class"], "java.util.ArrayList");
        assert_eq!(rendered["length"], 2);
        assert_eq!(
            rendered["items"],
            json!(["a", "b"])
        );
    }

    #[test]
    fn budget_exhaustion_sets_truncated_and_drops_whole_fields() {
        let mut fields = FakeObject::of("com.example.Wide");
        for i in 0..MAX_OBJECT_FIELDS {
            fields = fields.field(format!("field_{i}"), Value::Text("v".repeat(40)));
        }
        let object: ObjectRef = fields.build();

        let mut budget = TokenBudget::new(20); // 80 chars
        let mut registry = ObjectRegistry::new();
        let mut objects = |object: &ObjectRef| registry.handle_for(object);
        let rendered =
            inspect_envelope(&Value::Object(object), 1, &mut budget, None, &mut objects).unwrap();

        assert!(budget.truncated());
        let shown = rendered["fields"].as_object().unwrap();
        assert!(shown.len() < MAX_OBJECT_FIELDS);
        // Whatever made it in is complete, not clipped mid-value.
        for value in shown.values() {
            if let Some(text) = value.as_str() {
                assert!(!text.is_empty());
            }
        }
        assert!(budget.token_usage_estimate() <= 20);
    }

    #[test]
    fn collected_objects_surface_err_object_collected() {
        let object = FakeObject::of("com.example.Gone").build();
        object.collect();
        let value = Value::Object(object);
        let mut budget = TokenBudget::default();
        let mut registry = ObjectRegistry::new();
        let mut objects = |object: &ObjectRef| registry.handle_for(object);
        let err = inspect_envelope(&value, 1, &mut budget, None, &mut objects).unwrap_err();
        assert!(err.message.contains("ERR_OBJECT_COLLECTED"), "{}", err.message);
    }

    #[test]
    fn mapping_renames_fields_both_ways() {
        let mapping = Mapping::parse(
            "com.example.UserService -> a.b.c:\n    int profileId -> seed\n",
        );
        let helper: ObjectRef = FakeObject::of("a.b.c")
            .field("seed", Value::Int(7))
            .build();

        let mut budget = TokenBudget::default();
        let mut registry = ObjectRegistry::new();
        let mut objects = |object: &ObjectRef| registry.handle_for(object);
        let rendered = inspect_envelope(
            &Value::Object(helper),
            1,
            &mut budget,
            Some(&mapping),
            &mut objects,
        )
        .unwrap();

        assert_eq!(rendered["class"], "com.example.UserService");
        assert_eq!(rendered["fields"]["profileId"], json!(7));
        assert!(rendered["fields"].get("seed").is_none());
    }
}
