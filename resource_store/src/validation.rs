//! Resource validation
//!
//! Strict top-level property checking against a static schema table. Anything
//! beyond this (profiles, cardinality, terminology) belongs to the full
//! validation layer upstream of the repository.

use serde_json::Value;
use tx_system::errors::CarehausError;

const PATIENT_PROPERTIES: &[&str] = &[
    "resourceType",
    "id",
    "meta",
    "text",
    "identifier",
    "active",
    "name",
    "telecom",
    "gender",
    "birthDate",
    "deceasedBoolean",
    "deceasedDateTime",
    "address",
    "maritalStatus",
    "contact",
    "communication",
    "generalPractitioner",
    "managingOrganization",
    "link",
];

const PRACTITIONER_PROPERTIES: &[&str] = &[
    "resourceType",
    "id",
    "meta",
    "text",
    "identifier",
    "active",
    "name",
    "telecom",
    "address",
    "gender",
    "birthDate",
    "qualification",
    "communication",
];

const ORGANIZATION_PROPERTIES: &[&str] = &[
    "resourceType",
    "id",
    "meta",
    "text",
    "identifier",
    "active",
    "type",
    "name",
    "alias",
    "telecom",
    "address",
    "partOf",
    "contact",
    "endpoint",
];

const OBSERVATION_PROPERTIES: &[&str] = &[
    "resourceType",
    "id",
    "meta",
    "text",
    "identifier",
    "basedOn",
    "partOf",
    "status",
    "category",
    "code",
    "subject",
    "encounter",
    "effectiveDateTime",
    "effectivePeriod",
    "issued",
    "performer",
    "valueQuantity",
    "valueCodeableConcept",
    "valueString",
    "valueBoolean",
    "dataAbsentReason",
    "interpretation",
    "note",
    "bodySite",
    "method",
    "referenceRange",
    "component",
];

const ENCOUNTER_PROPERTIES: &[&str] = &[
    "resourceType",
    "id",
    "meta",
    "text",
    "identifier",
    "status",
    "class",
    "type",
    "priority",
    "subject",
    "participant",
    "period",
    "reasonCode",
    "diagnosis",
    "location",
    "serviceProvider",
    "partOf",
];

fn known_properties(resource_type: &str) -> Option<&'static [&'static str]> {
    match resource_type {
        "Patient" => Some(PATIENT_PROPERTIES),
        "Practitioner" => Some(PRACTITIONER_PROPERTIES),
        "Organization" => Some(ORGANIZATION_PROPERTIES),
        "Observation" => Some(OBSERVATION_PROPERTIES),
        "Encounter" => Some(ENCOUNTER_PROPERTIES),
        _ => None,
    }
}

/// Validate a resource body against the schema for `resource_type`
pub fn validate_content(resource_type: &str, content: &Value) -> Result<(), CarehausError> {
    let object = content.as_object().ok_or_else(|| {
        CarehausError::validation(
            "Resource must be a JSON object",
            vec![resource_type.to_string()],
        )
    })?;

    let properties = known_properties(resource_type).ok_or_else(|| {
        CarehausError::validation(
            format!("Unknown resource type \"{}\"", resource_type),
            Vec::new(),
        )
    })?;

    if let Some(declared) = object.get("resourceType").and_then(Value::as_str) {
        if declared != resource_type {
            return Err(CarehausError::validation(
                format!(
                    "Resource type mismatch: expected \"{}\", found \"{}\"",
                    resource_type, declared
                ),
                vec![format!("{}.resourceType", resource_type)],
            ));
        }
    }

    for key in object.keys() {
        if !properties.contains(&key.as_str()) {
            return Err(CarehausError::validation(
                format!("Invalid additional property \"{}\"", key),
                vec![format!("{}.{}", resource_type, key)],
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_patient_passes() {
        let content = json!({
            "resourceType": "Patient",
            "name": [{"family": "Simpson", "given": ["Homer"]}],
            "identifier": [{"system": "http://example.com/mrn", "value": "12345"}],
            "birthDate": "1956-05-12"
        });
        assert!(validate_content("Patient", &content).is_ok());
    }

    #[test]
    fn test_additional_property_is_rejected() {
        let content = json!({"resourceType": "Patient", "foo": "bar"});
        let err = validate_content("Patient", &content).unwrap_err();
        match err {
            CarehausError::Validation { text, expression } => {
                assert_eq!(text, "Invalid additional property \"foo\"");
                assert_eq!(expression, vec!["Patient.foo".to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_resource_type_mismatch_is_rejected() {
        let content = json!({"resourceType": "Observation"});
        let err = validate_content("Patient", &content).unwrap_err();
        match err {
            CarehausError::Validation { expression, .. } => {
                assert_eq!(expression, vec!["Patient.resourceType".to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        let err = validate_content("Patient", &json!("not an object")).unwrap_err();
        assert!(matches!(err, CarehausError::Validation { .. }));
    }

    #[test]
    fn test_unknown_resource_type_is_rejected() {
        let err = validate_content("Spaceship", &json!({})).unwrap_err();
        match err {
            CarehausError::Validation { text, .. } => {
                assert_eq!(text, "Unknown resource type \"Spaceship\"");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
