use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::merge::{descend_or_create, ParameterError};

/// Location of the flat Flink settings inside a deployment request.
pub const FLINK_CONFIGURATION_PATH: [&str; 4] = ["spec", "template", "spec", "flinkConfiguration"];

/// Stores `flink_parameters` verbatim at `spec.template.spec.flinkConfiguration`.
///
/// Keys such as `state.backend` stay flat; they are never split on `.`.
pub fn inject_flink_config(
    request: &mut Map<String, Value>,
    flink_parameters: &BTreeMap<String, String>,
) -> Result<(), ParameterError> {
    let (field, parents) = match FLINK_CONFIGURATION_PATH.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };
    let display_path = FLINK_CONFIGURATION_PATH.join(".");
    let spec = descend_or_create(request, parents, &display_path)?;

    let configuration: Map<String, Value> = flink_parameters
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    spec.insert(field.to_string(), Value::Object(configuration));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flink_settings_land_flat_under_template_spec() {
        let mut request = match json!({ "key": "value", "spec": { "dummykey": "dummyvalue" } }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let flink = BTreeMap::from([("flink.setting".to_string(), "settingvalue".to_string())]);

        inject_flink_config(&mut request, &flink).expect("inject");

        assert_eq!(
            Value::Object(request),
            json!({
                "key": "value",
                "spec": {
                    "dummykey": "dummyvalue",
                    "template": {
                        "spec": {
                            "flinkConfiguration": { "flink.setting": "settingvalue" }
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn existing_flink_configuration_is_replaced() {
        let mut request = match json!({
            "spec": { "template": { "spec": { "flinkConfiguration": { "old": "1" }, "parallelism": 2 } } }
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let flink = BTreeMap::from([("taskmanager.numberOfTaskSlots".to_string(), "4".to_string())]);

        inject_flink_config(&mut request, &flink).expect("inject");

        assert_eq!(
            request["spec"]["template"]["spec"],
            json!({ "flinkConfiguration": { "taskmanager.numberOfTaskSlots": "4" }, "parallelism": 2 })
        );
    }

    #[test]
    fn scalar_on_the_way_is_a_conflict() {
        let mut request = match json!({ "spec": { "template": "oops" } }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let err = inject_flink_config(&mut request, &BTreeMap::new()).expect_err("conflict");
        assert_eq!(
            err,
            ParameterError::LeafConflict {
                path: "spec.template.spec.flinkConfiguration".to_string(),
                leaf: "spec.template".to_string(),
            }
        );
    }
}
