use fhir::{Bundle, Resource};
use narrative_core::{
    into_bundle, resolve_template_dir, CoreConfig, NarrativeError, NarrativeRenderer,
    NarrativeService, RenderOutcome, XhtmlFragment,
};
use serde_json::{json, Value};

const XHTML_OPEN: &str = "<div xmlns=\"http://www.w3.org/1999/xhtml\">";

/// Renders `<div>Type/id</div>`. Fails for every resource type listed in `failing`.
struct StubRenderer {
    failing: &'static [&'static str],
}

impl NarrativeRenderer for StubRenderer {
    fn render(&self, resource: &Resource) -> RenderOutcome {
        if self.failing.iter().any(|t| *t == resource.resource_type()) {
            return RenderOutcome::Failed("template exploded".into());
        }
        if resource.is_composition() {
            return RenderOutcome::Empty;
        }
        XhtmlFragment::new(format!("<div>{}</div>", resource.label()))
            .map_or(RenderOutcome::Empty, RenderOutcome::Fragment)
    }
}

fn stub_service() -> NarrativeService<StubRenderer> {
    NarrativeService::new(StubRenderer { failing: &[] })
}

fn bundle(value: Value) -> Bundle {
    let resource = Resource::from_value(value).expect("valid resource");
    into_bundle(resource).expect("bundle")
}

fn document(sections: Value, resources: Vec<Value>) -> Bundle {
    let mut entries = vec![json!({
        "fullUrl": "urn:uuid:comp",
        "resource": {
            "resourceType": "Composition",
            "id": "comp",
            "status": "final",
            "title": "Discharge letter",
            "section": sections
        }
    })];
    entries.extend(resources.into_iter().map(|resource| json!({ "resource": resource })));
    bundle(json!({ "resourceType": "Bundle", "type": "document", "entry": entries }))
}

fn sections(bundle: &Bundle) -> Value {
    let value = Resource::from(bundle.clone()).to_value().expect("to value");
    value["entry"][0]["resource"]["section"].clone()
}

fn resource(resource_type: &str, id: &str) -> Value {
    json!({ "resourceType": resource_type, "id": id })
}

#[test]
fn reference_forms_are_equivalent() {
    let mut outputs = Vec::new();
    for reference in ["obs-1", "urn:uuid:obs-1", "Observation/obs-1"] {
        let mut bundle = document(
            json!([{ "title": "Results", "entry": [{ "reference": reference }] }]),
            vec![resource("Observation", "obs-1")],
        );
        stub_service()
            .bundle_with_section_text(&mut bundle)
            .expect("assemble");
        let sections = sections(&bundle);
        assert_eq!(sections.as_array().map(Vec::len), Some(1), "{reference}");
        outputs.push(sections[0]["text"].clone());
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
    assert_eq!(
        outputs[0]["div"],
        format!("{XHTML_OPEN}<div>Observation/obs-1</div></div>")
    );
    assert_eq!(outputs[0]["status"], "generated");
}

#[test]
fn contributions_keep_reference_order_with_separator() {
    let mut bundle = document(
        json!([{
            "title": "Findings",
            "entry": [
                { "reference": "Condition/c2" },
                { "reference": "urn:uuid:c1" },
                { "display": "free text only" },
                { "reference": "Procedure/pr1" }
            ]
        }]),
        vec![
            resource("Condition", "c1"),
            resource("Condition", "c2"),
            resource("Procedure", "pr1"),
        ],
    );
    stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");

    assert_eq!(
        sections(&bundle)[0]["text"]["div"],
        format!(
            "{XHTML_OPEN}<div>Condition/c2</div><hr/><div>Condition/c1</div><hr/><div>Procedure/pr1</div></div>"
        )
    );
}

#[test]
fn orphans_get_one_section_each_and_referenced_resources_none() {
    let mut bundle = document(
        json!([{ "title": "Vitals", "entry": [{ "reference": "Observation/o1" }] }]),
        vec![
            resource("Patient", "p1"),
            resource("Observation", "o1"),
            resource("Encounter", "e1"),
            json!({ "resourceType": "Binary", "id": "b1", "contentType": "text/plain" }),
        ],
    );
    let report = stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");
    assert_eq!(report.sections.synthesized, 2);

    let sections = sections(&bundle);
    let titles: Vec<&str> = sections
        .as_array()
        .expect("sections")
        .iter()
        .filter_map(|section| section["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Vitals", "Patient", "Encounter"]);
    assert_eq!(sections[1]["entry"], json!([{ "reference": "Patient/p1" }]));
    assert_eq!(sections[2]["text"]["div"], "<div>Encounter/e1</div>");
}

#[test]
fn assembly_is_idempotent() {
    let mut bundle = document(
        json!([
            { "title": "Vitals", "entry": [{ "reference": "o1" }] },
            { "title": "Empty", "entry": [] }
        ]),
        vec![resource("Observation", "o1"), resource("Patient", "p1")],
    );
    let service = stub_service();
    service.bundle_with_section_text(&mut bundle).expect("first pass");
    let once = bundle.clone();

    let report = service
        .bundle_with_section_text(&mut bundle)
        .expect("second pass");
    assert_eq!(report.sections.synthesized, 0);
    assert_eq!(bundle, once);
}

#[test]
fn authored_section_text_survives() {
    let authored = json!({ "status": "additional", "div": "<div>Written by Dr. Who</div>" });
    let mut bundle = document(
        json!([{ "title": "Plan", "text": authored, "entry": [{ "reference": "Procedure/pr1" }] }]),
        vec![resource("Procedure", "pr1")],
    );
    stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");

    let sections = sections(&bundle);
    assert_eq!(sections[0]["text"], authored);
    assert_eq!(sections.as_array().map(Vec::len), Some(1));
}

#[test]
fn entry_narratives_are_never_lost() {
    let mut bundle = document(
        json!([{ "title": "Vitals", "entry": [{ "reference": "o1" }] }]),
        vec![resource("Observation", "o1"), resource("Patient", "p1")],
    );
    stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");

    let divs: Vec<Option<&str>> = bundle
        .resources()
        .skip(1)
        .map(Resource::narrative_div)
        .collect();
    assert_eq!(
        divs,
        vec![Some("<div>Observation/o1</div>"), Some("<div>Patient/p1</div>")]
    );
}

#[test]
fn missing_composition_is_fatal() {
    let mut bundle = bundle(json!({
        "resourceType": "Bundle",
        "type": "collection",
        "entry": [{ "resource": resource("Patient", "p1") }]
    }));
    let err = stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect_err("no composition");
    assert!(matches!(err, NarrativeError::NoComposition));
    assert_eq!(err.to_string(), "no Composition found in Bundle");
}

#[test]
fn render_failures_do_not_stop_assembly() {
    let service = NarrativeService::new(StubRenderer {
        failing: &["Observation"],
    });
    let mut bundle = document(
        json!([{ "title": "Vitals", "entry": [{ "reference": "Observation/o1" }] }]),
        vec![resource("Observation", "o1"), resource("Patient", "p1")],
    );
    let report = service
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");

    assert_eq!(report.population.failures.len(), 1);
    assert_eq!(report.population.failures[0].resource, "Observation/o1");
    assert_eq!(report.population.generated, 1);
    assert_eq!(report.sections.reconciled.without_narrative, 1);

    let sections = sections(&bundle);
    assert!(sections[0].get("text").is_none());
    assert_eq!(sections[1]["title"], "Patient");
}

#[test]
fn duplicate_ids_all_contribute() {
    let mut bundle = document(
        json!([{ "title": "Results", "entry": [{ "reference": "Observation/dup" }] }]),
        vec![
            json!({ "resourceType": "Observation", "id": "dup", "status": "final" }),
            json!({ "resourceType": "Observation", "id": "dup", "status": "amended" }),
        ],
    );
    stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");
    assert_eq!(
        sections(&bundle)[0]["text"]["div"],
        format!("{XHTML_OPEN}<div>Observation/dup</div><hr/><div>Observation/dup</div></div>")
    );
}

#[test]
fn bundled_templates_render_a_document() {
    let dir = resolve_template_dir(None).expect("template dir");
    let config = CoreConfig::new(dir).expect("config");
    let service = NarrativeService::from_config(&config).expect("service");

    let mut bundle = document(
        json!([{ "title": "Diagnosen", "entry": [{ "reference": "Condition/cond-1" }] }]),
        vec![
            json!({
                "resourceType": "Patient",
                "id": "p1",
                "name": [{ "family": "Müller", "given": ["Thomas", "Wilhelm"] }],
                "gender": "male",
                "birthDate": "1965-04-11"
            }),
            json!({
                "resourceType": "Condition",
                "id": "cond-1",
                "code": { "coding": [{ "code": "I10", "display": "Hypertonie" }] },
                "recordedDate": "2024-01-02"
            }),
            json!({
                "resourceType": "Observation",
                "id": "bp",
                "status": "final",
                "code": { "text": "Blutdruck" },
                "component": [
                    {
                        "code": { "coding": [{ "display": "Systolisch" }] },
                        "valueQuantity": { "value": 120, "unit": "mmHg" }
                    },
                    {
                        "code": { "coding": [{ "display": "Diastolisch" }] },
                        "valueQuantity": { "value": 80, "unit": "mmHg" }
                    }
                ]
            }),
        ],
    );
    let report = service
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");
    assert!(report.population.failures.is_empty(), "{:?}", report.population.failures);
    assert_eq!(report.population.generated, 4);

    let patient = bundle
        .resources()
        .find(|r| r.resource_type() == "Patient")
        .and_then(Resource::narrative_div)
        .expect("patient narrative");
    assert!(patient.starts_with(XHTML_OPEN));
    assert!(patient.contains("Müller"));
    assert!(patient.contains("Thomas, Wilhelm"));
    assert!(patient.contains("Geburtsdatum"));

    let sections = sections(&bundle);
    let diagnosen = sections[0]["text"]["div"].as_str().expect("section text");
    assert!(diagnosen.contains("Hypertonie"));
    assert!(diagnosen.contains("I10"));

    let titles: Vec<&str> = sections
        .as_array()
        .expect("sections")
        .iter()
        .filter_map(|s| s["title"].as_str())
        .collect();
    assert_eq!(titles, vec!["Diagnosen", "Patient", "Observation"]);
    let bp = sections[2]["text"]["div"].as_str().expect("bp text");
    assert!(bp.contains("Systolisch"));
    assert!(bp.contains("120 mmHg"));
}

#[test]
fn xml_documents_round_trip_through_assembly() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Bundle xmlns="http://hl7.org/fhir">
  <type value="document"/>
  <entry>
    <fullUrl value="urn:uuid:comp"/>
    <resource>
      <Composition>
        <id value="comp"/>
        <status value="final"/>
        <title value="Brief"/>
        <section>
          <title value="Befunde"/>
          <entry><reference value="urn:uuid:o1"/></entry>
        </section>
      </Composition>
    </resource>
  </entry>
  <entry>
    <resource>
      <Observation>
        <id value="o1"/>
        <status value="final"/>
      </Observation>
    </resource>
  </entry>
</Bundle>"#;

    let (resource, format) = fhir::parse_document(xml).expect("parse xml");
    assert_eq!(format, fhir::DocumentFormat::Xml);
    let mut bundle = into_bundle(resource).expect("bundle");
    stub_service()
        .bundle_with_section_text(&mut bundle)
        .expect("assemble");

    let written = fhir::serialize(&bundle.clone().into(), format, false).expect("serialize");
    let (reparsed, _) = fhir::parse_document(&written).expect("reparse");
    let reparsed = into_bundle(reparsed).expect("bundle");
    assert_eq!(
        sections(&reparsed)[0]["text"]["div"],
        format!("{XHTML_OPEN}<div>Observation/o1</div></div>")
    );
}
