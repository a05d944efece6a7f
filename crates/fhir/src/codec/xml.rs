//! FHIR XML.
//!
//! Translates between FHIR XML and the JSON object model the wire types are built on:
//! - the root element is named after the resource type and declares the FHIR namespace
//! - primitives are elements carrying a `value` attribute; their `id` and extensions map to
//!   the `_name` companion member of the JSON form
//! - element `id` and extension `url` are attributes
//! - nested resources are wrapped (`<resource><Patient>..</Patient></resource>`)
//! - narrative `div` elements are kept as raw XHTML markup
//!
//! Notes:
//! - Primitive values read from XML are strings; the XML form carries no JSON type.
//! - Without a schema, an element becomes an array when it repeats or when its name is in
//!   `REPEATING_ELEMENTS`.

use crate::resource::Resource;
use crate::{FhirError, FhirResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

/// Namespace of FHIR XML documents.
pub const FHIR_NAMESPACE: &str = "http://hl7.org/fhir";

/// Element names that repeat wherever they occur in R4.
const REPEATING_ELEMENTS: &[&str] = &[
    "entry",
    "section",
    "extension",
    "modifierExtension",
    "contained",
    "identifier",
    "telecom",
    "address",
    "given",
    "prefix",
    "suffix",
    "line",
    "coding",
    "profile",
    "security",
    "tag",
    "link",
    "author",
    "attester",
    "category",
    "component",
    "performer",
    "referenceRange",
    "interpretation",
    "note",
    "basedOn",
    "partOf",
    "hasMember",
    "derivedFrom",
    "participant",
    "reasonCode",
    "reasonReference",
    "diagnosis",
    "contact",
    "communication",
    "generalPractitioner",
];

fn xml_error(err: impl std::fmt::Display) -> FhirError {
    FhirError::InvalidXml(err.to_string())
}

// ============================================================================
// Reading
// ============================================================================

/// A parsed element before it is placed into its parent.
enum Node {
    /// A primitive value plus its companion members (`id`, `extension`).
    Primitive(String, Map<String, Value>),
    Complex(Map<String, Value>),
}

/// Parse a resource from FHIR XML.
pub fn from_xml(text: &str) -> FhirResult<Resource> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                let name = local_name(&start)?;
                let members = read_members(&mut reader)?;
                return Resource::from_value(Value::Object(resource_object(&name, members)));
            }
            Event::Empty(start) => {
                let name = local_name(&start)?;
                return Resource::from_value(Value::Object(resource_object(&name, Map::new())));
            }
            Event::Eof => {
                return Err(FhirError::InvalidXml("document has no root element".into()));
            }
            _ => {}
        }
    }
}

/// Read child elements until the end tag of the current element.
fn read_members(reader: &mut Reader<&[u8]>) -> FhirResult<Map<String, Value>> {
    let mut members = Map::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                let name = local_name(&start)?;
                if name == "div" {
                    let inner = reader.read_text(start.name()).map_err(xml_error)?;
                    let markup = format!(
                        "<{}>{}</{}>",
                        raw_tag(&start)?,
                        inner,
                        std::str::from_utf8(start.name().as_ref()).map_err(xml_error)?
                    );
                    add_node(&mut members, &name, Node::Primitive(markup, Map::new()));
                    continue;
                }
                let (value, attributes) = read_attributes(&start)?;
                let children = read_members(reader)?;
                add_node(
                    &mut members,
                    &name,
                    element_node(&name, value, attributes, children),
                );
            }
            Event::Empty(start) => {
                let name = local_name(&start)?;
                if name == "div" {
                    let markup = format!("<{}/>", raw_tag(&start)?);
                    add_node(&mut members, &name, Node::Primitive(markup, Map::new()));
                    continue;
                }
                let (value, attributes) = read_attributes(&start)?;
                add_node(
                    &mut members,
                    &name,
                    element_node(&name, value, attributes, Map::new()),
                );
            }
            Event::End(_) => return Ok(members),
            Event::Eof => {
                return Err(FhirError::InvalidXml("unexpected end of document".into()));
            }
            _ => {}
        }
    }
}

fn element_node(
    name: &str,
    value: Option<String>,
    mut attributes: Map<String, Value>,
    children: Map<String, Value>,
) -> Node {
    if is_resource_name(name) {
        return Node::Complex(resource_object(name, children));
    }

    // `<resource><Patient>..</Patient></resource>` carries the nested resource itself.
    if attributes.is_empty() && children.len() == 1 {
        if let Some((key, Value::Object(inner))) = children.iter().next() {
            if is_resource_name(key) && inner.contains_key("resourceType") {
                return Node::Complex(inner.clone());
            }
        }
    }

    attributes.extend(children);
    match value {
        Some(value) => Node::Primitive(value, attributes),
        None => Node::Complex(attributes),
    }
}

fn add_node(members: &mut Map<String, Value>, name: &str, node: Node) {
    let repeating = REPEATING_ELEMENTS.contains(&name) || members.contains_key(name);

    if !repeating {
        match node {
            Node::Complex(object) => {
                members.insert(name.to_string(), Value::Object(object));
            }
            Node::Primitive(value, companion) => {
                members.insert(name.to_string(), Value::String(value));
                if !companion.is_empty() {
                    members.insert(format!("_{name}"), Value::Object(companion));
                }
            }
        }
        return;
    }

    match node {
        Node::Complex(object) => {
            push_repeated(members, name, Value::Object(object));
        }
        Node::Primitive(value, companion) => {
            let index = push_repeated(members, name, Value::String(value));
            let companion_key = format!("_{name}");
            if companion.is_empty() && !members.contains_key(&companion_key) {
                return;
            }
            let slot = members
                .entry(companion_key)
                .or_insert_with(|| Value::Array(Vec::new()));
            if !slot.is_array() {
                *slot = Value::Array(vec![slot.take()]);
            }
            if let Value::Array(items) = slot {
                items.resize(index, Value::Null);
                items.push(if companion.is_empty() {
                    Value::Null
                } else {
                    Value::Object(companion)
                });
            }
        }
    }
}

/// Append `item` to the array member `key`, promoting a single value to an array first.
/// Returns the index of the new item.
fn push_repeated(members: &mut Map<String, Value>, key: &str, item: Value) -> usize {
    let slot = members
        .entry(key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(vec![slot.take()]);
    }
    match slot {
        Value::Array(items) => {
            items.push(item);
            items.len() - 1
        }
        _ => 0,
    }
}

fn read_attributes(start: &BytesStart<'_>) -> FhirResult<(Option<String>, Map<String, Value>)> {
    let mut value = None;
    let mut attributes = Map::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = std::str::from_utf8(attribute.key.as_ref()).map_err(xml_error)?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let text = attribute.unescape_value().map_err(xml_error)?.into_owned();
        if key == "value" {
            value = Some(text);
        } else {
            attributes.insert(key.to_string(), Value::String(text));
        }
    }

    Ok((value, attributes))
}

fn resource_object(resource_type: &str, members: Map<String, Value>) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert(
        "resourceType".to_string(),
        Value::String(resource_type.to_string()),
    );
    object.extend(members);
    object
}

fn is_resource_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn local_name(start: &BytesStart<'_>) -> FhirResult<String> {
    std::str::from_utf8(start.local_name().as_ref())
        .map(str::to_string)
        .map_err(xml_error)
}

/// Tag content between `<` and `>`, attributes included.
fn raw_tag<'a>(start: &'a BytesStart<'_>) -> FhirResult<&'a str> {
    std::str::from_utf8(start).map_err(xml_error)
}

// ============================================================================
// Writing
// ============================================================================

type XmlWriter = Writer<Vec<u8>>;

/// Serialise a resource as FHIR XML.
pub fn to_xml(resource: &Resource, pretty: bool) -> FhirResult<String> {
    let value = resource.to_value()?;
    let object = value.as_object().ok_or_else(|| {
        FhirError::Translation("resource did not serialise to an object".into())
    })?;

    let mut writer = if pretty {
        Writer::new_with_indent(Vec::new(), b' ', 2)
    } else {
        Writer::new(Vec::new())
    };
    write_resource(&mut writer, object, true)?;

    String::from_utf8(writer.into_inner()).map_err(|e| FhirError::Translation(e.to_string()))
}

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> FhirResult<()> {
    writer.write_event(event).map_err(xml_error)
}

fn write_resource(
    writer: &mut XmlWriter,
    object: &Map<String, Value>,
    root: bool,
) -> FhirResult<()> {
    let name = object
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| FhirError::Translation("resource without resourceType".into()))?;

    let mut start = BytesStart::new(name);
    if root {
        start.push_attribute(("xmlns", FHIR_NAMESPACE));
    }
    emit(writer, Event::Start(start))?;
    write_members(writer, object, None)?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

/// Write the members of a resource (`element` is `None`) or of a complex element.
fn write_members(
    writer: &mut XmlWriter,
    object: &Map<String, Value>,
    element: Option<&str>,
) -> FhirResult<()> {
    for (key, value) in object {
        if key == "resourceType" {
            continue;
        }
        if let Some(base) = key.strip_prefix('_') {
            // Extensions on a primitive without a value.
            if !object.contains_key(base) {
                write_element(writer, base, &Value::Null, Some(value))?;
            }
            continue;
        }
        if is_attribute(key, value, element) {
            continue;
        }
        let companion = object.get(&format!("_{key}"));
        write_element(writer, key, value, companion)?;
    }
    Ok(())
}

fn is_attribute(key: &str, value: &Value, element: Option<&str>) -> bool {
    match (key, element) {
        (_, None) => false,
        ("id", Some(_)) => value.is_string(),
        ("url", Some(name)) => {
            value.is_string() && (name == "extension" || name == "modifierExtension")
        }
        _ => false,
    }
}

fn write_element(
    writer: &mut XmlWriter,
    name: &str,
    value: &Value,
    companion: Option<&Value>,
) -> FhirResult<()> {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let item_companion = companion
                    .and_then(|c| c.get(index))
                    .filter(|c| !c.is_null());
                write_element(writer, name, item, item_companion)?;
            }
            Ok(())
        }
        Value::Object(object) if object.contains_key("resourceType") => {
            emit(writer, Event::Start(BytesStart::new(name)))?;
            write_resource(writer, object, false)?;
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        Value::Object(object) => write_complex(writer, name, object),
        Value::String(markup) if name == "div" => {
            emit(writer, Event::Text(BytesText::from_escaped(markup.as_str())))
        }
        Value::Null => match companion.and_then(Value::as_object) {
            Some(companion) => write_primitive(writer, name, None, Some(companion)),
            None => Ok(()),
        },
        primitive => write_primitive(
            writer,
            name,
            Some(primitive_text(primitive)),
            companion.and_then(Value::as_object),
        ),
    }
}

fn write_complex(
    writer: &mut XmlWriter,
    name: &str,
    object: &Map<String, Value>,
) -> FhirResult<()> {
    let mut start = BytesStart::new(name);
    for key in ["id", "url"] {
        if let Some(value) = object.get(key) {
            if is_attribute(key, value, Some(name)) {
                start.push_attribute((key, primitive_text(value).as_str()));
            }
        }
    }

    let has_children = object
        .iter()
        .any(|(key, value)| !is_attribute(key, value, Some(name)));
    if !has_children {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    write_members(writer, object, Some(name))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn write_primitive(
    writer: &mut XmlWriter,
    name: &str,
    value: Option<String>,
    companion: Option<&Map<String, Value>>,
) -> FhirResult<()> {
    let mut start = BytesStart::new(name);
    if let Some(id) = companion.and_then(|c| c.get("id")).and_then(Value::as_str) {
        start.push_attribute(("id", id));
    }
    if let Some(value) = &value {
        start.push_attribute(("value", value.as_str()));
    }

    let children = companion.filter(|c| {
        c.iter()
            .any(|(key, value)| !is_attribute(key, value, Some(name)))
    });
    match children {
        Some(companion) => {
            emit(writer, Event::Start(start))?;
            write_members(writer, companion, Some(name))?;
            emit(writer, Event::End(BytesEnd::new(name)))
        }
        None => emit(writer, Event::Empty(start)),
    }
}

fn primitive_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
