//////////////////////////////////////////// JsonSchema ////////////////////////////////////////////

/// Implement JsonSchema to describe the JSON a type expects the model to produce.
///
/// The schema is sent verbatim as the `format` field of a chat request, which constrains the
/// model server's sampler to that shape.
pub trait JsonSchema {
    /// Return the json_schema.  Does not depend on an object.
    fn json_schema() -> serde_json::Value;
}

impl JsonSchema for String {
    fn json_schema() -> serde_json::Value {
        serde_json::json! {{ "type": "string" }}
    }
}

/// Any JSON value.  Signal payloads are opaque, so their schema is unconstrained.
impl JsonSchema for serde_json::Value {
    fn json_schema() -> serde_json::Value {
        serde_json::json! {{}}
    }
}

impl<T: JsonSchema> JsonSchema for Option<T> {
    fn json_schema() -> serde_json::Value {
        serde_json::json! {{
            "anyOf": [<T as JsonSchema>::json_schema(), { "type": "null" }]
        }}
    }
}
