//! Canonicalizes IIIF manifests to Presentation 3.
//!
//! Presentation 3 manifests are normalized in place (context, language maps).
//! Presentation 2 manifests are upgraded: `@id`/`@type` become `id`/`type`,
//! plain strings become language maps, `description` becomes `summary`,
//! `attribution` becomes `requiredStatement`, and the first sequence's canvases
//! become `items` with one painting annotation page per canvas.

use async_trait::async_trait;
use sandbox_core::convert::{ConversionError, DocumentConverter};
use serde_json::{json, Map, Value};
use tracing::instrument;

pub const PRESENTATION_3_CONTEXT: &str = "http://iiif.io/api/presentation/3/context.json";

const NO_LANGUAGE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    V2,
    V3,
}

fn detect(obj: &Map<String, Value>) -> Option<Version> {
    if obj.get("type").and_then(Value::as_str) == Some("Manifest") {
        return Some(Version::V3);
    }
    if obj.get("@type").and_then(Value::as_str) == Some("sc:Manifest") {
        return Some(Version::V2);
    }
    None
}

/// Local converter for IIIF manifests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestUpgrader;

impl ManifestUpgrader {
    pub fn upgrade(raw: &Value) -> Result<Value, ConversionError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ConversionError::Unrecognized("expected a JSON object".to_string()))?;

        match detect(obj) {
            Some(Version::V3) => normalize_v3(obj),
            Some(Version::V2) => upgrade_v2(obj),
            None => Err(ConversionError::Unrecognized(
                "resource is not a IIIF manifest".to_string(),
            )),
        }
    }
}

#[async_trait]
impl DocumentConverter for ManifestUpgrader {
    fn name(&self) -> &'static str {
        "presentation3"
    }

    #[instrument(skip_all, fields(converter = "presentation3"))]
    async fn convert(&self, raw: &Value) -> Result<Value, ConversionError> {
        Self::upgrade(raw)
    }
}

fn normalize_v3(obj: &Map<String, Value>) -> Result<Value, ConversionError> {
    if !obj.get("id").is_some_and(Value::is_string) {
        return Err(ConversionError::Rejected("manifest has no id".to_string()));
    }

    let mut out = obj.clone();
    out.entry("@context")
        .or_insert_with(|| Value::String(PRESENTATION_3_CONTEXT.to_string()));
    for field in ["label", "summary"] {
        if let Some(value) = out.get_mut(field) {
            *value = language_map(value);
        }
    }
    Ok(Value::Object(out))
}

fn upgrade_v2(obj: &Map<String, Value>) -> Result<Value, ConversionError> {
    let id = obj
        .get("@id")
        .and_then(Value::as_str)
        .ok_or_else(|| ConversionError::Rejected("manifest has no @id".to_string()))?;

    let mut out = Map::new();
    out.insert("@context".into(), json!(PRESENTATION_3_CONTEXT));
    out.insert("id".into(), json!(id));
    out.insert("type".into(), json!("Manifest"));

    if let Some(label) = obj.get("label") {
        out.insert("label".into(), language_map(label));
    }
    if let Some(description) = obj.get("description") {
        out.insert("summary".into(), language_map(description));
    }
    if let Some(Value::Array(entries)) = obj.get("metadata") {
        let metadata: Vec<Value> = entries.iter().filter_map(metadata_entry).collect();
        out.insert("metadata".into(), Value::Array(metadata));
    }
    if let Some(attribution) = obj.get("attribution") {
        out.insert(
            "requiredStatement".into(),
            json!({
                "label": { "none": ["Attribution"] },
                "value": language_map(attribution),
            }),
        );
    }
    if let Some(license) = obj.get("license").and_then(Value::as_str) {
        out.insert("rights".into(), json!(license));
    }
    if let Some(thumbnail) = obj.get("thumbnail") {
        out.insert("thumbnail".into(), Value::Array(image_refs(thumbnail)));
    }
    for passthrough in ["viewingDirection", "navDate"] {
        if let Some(value) = obj.get(passthrough) {
            out.insert(passthrough.into(), value.clone());
        }
    }

    let canvases = obj
        .get("sequences")
        .and_then(Value::as_array)
        .and_then(|sequences| sequences.first())
        .and_then(|sequence| sequence.get("canvases"))
        .and_then(Value::as_array);
    let items: Vec<Value> = canvases
        .map(|canvases| canvases.iter().filter_map(upgrade_canvas).collect())
        .unwrap_or_default();
    out.insert("items".into(), Value::Array(items));

    Ok(Value::Object(out))
}

fn metadata_entry(entry: &Value) -> Option<Value> {
    let label = entry.get("label")?;
    let value = entry.get("value")?;
    Some(json!({
        "label": language_map(label),
        "value": language_map(value),
    }))
}

fn upgrade_canvas(canvas: &Value) -> Option<Value> {
    let id = canvas.get("@id").and_then(Value::as_str)?;

    let mut out = Map::new();
    out.insert("id".into(), json!(id));
    out.insert("type".into(), json!("Canvas"));
    if let Some(label) = canvas.get("label") {
        out.insert("label".into(), language_map(label));
    }
    for dimension in ["width", "height"] {
        if let Some(value) = canvas.get(dimension) {
            out.insert(dimension.into(), value.clone());
        }
    }

    let annotations: Vec<Value> = canvas
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .enumerate()
                .filter_map(|(idx, image)| painting_annotation(id, idx, image))
                .collect()
        })
        .unwrap_or_default();
    out.insert(
        "items".into(),
        json!([{
            "id": format!("{id}/page"),
            "type": "AnnotationPage",
            "items": annotations,
        }]),
    );

    Some(Value::Object(out))
}

fn painting_annotation(canvas_id: &str, idx: usize, image: &Value) -> Option<Value> {
    let resource = image.get("resource")?;
    let resource_id = resource.get("@id").and_then(Value::as_str)?;

    let mut body = Map::new();
    body.insert("id".into(), json!(resource_id));
    body.insert("type".into(), json!("Image"));
    for field in ["format", "width", "height"] {
        if let Some(value) = resource.get(field) {
            body.insert(field.into(), value.clone());
        }
    }
    if let Some(service) = resource.get("service") {
        body.insert("service".into(), Value::Array(image_services(service)));
    }

    let anno_id = image
        .get("@id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{canvas_id}/annotation/{idx}"));

    Some(json!({
        "id": anno_id,
        "type": "Annotation",
        "motivation": "painting",
        "body": body,
        "target": canvas_id,
    }))
}

fn image_services(service: &Value) -> Vec<Value> {
    let services: Vec<&Value> = match service {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    services
        .into_iter()
        .filter_map(|svc| {
            let id = svc.get("@id").or_else(|| svc.get("id"))?;
            let mut out = json!({ "id": id, "type": "ImageService2" });
            if let Some(profile) = svc.get("profile") {
                out["profile"] = profile.clone();
            }
            Some(out)
        })
        .collect()
}

fn image_refs(value: &Value) -> Vec<Value> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    items
        .into_iter()
        .filter_map(|item| {
            let id = match item {
                Value::String(s) => s.as_str(),
                Value::Object(obj) => obj.get("@id").or_else(|| obj.get("id"))?.as_str()?,
                _ => return None,
            };
            Some(json!({ "id": id, "type": "Image" }))
        })
        .collect()
}

/// Coerce a v2 string / `@value` object / array into a v3 language map.
/// Values that already look like language maps pass through unchanged.
fn language_map(value: &Value) -> Value {
    let mut map: Map<String, Value> = Map::new();
    let mut push = |lang: &str, text: Value| {
        let slot = map
            .entry(lang.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = slot {
            values.push(text);
        }
    };

    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => push(NO_LANGUAGE, value.clone()),
        Value::Array(items) => {
            for item in items {
                match tagged_value(item) {
                    Some((lang, text)) => push(lang, text),
                    None => push(NO_LANGUAGE, item.clone()),
                }
            }
        }
        Value::Object(_) => match tagged_value(value) {
            Some((lang, text)) => push(lang, text),
            None => return value.clone(),
        },
        Value::Null => return Value::Null,
    }
    Value::Object(map)
}

fn tagged_value(item: &Value) -> Option<(&str, Value)> {
    let text = item.get("@value")?.clone();
    let lang = item
        .get("@language")
        .and_then(Value::as_str)
        .unwrap_or(NO_LANGUAGE);
    Some((lang, text))
}
