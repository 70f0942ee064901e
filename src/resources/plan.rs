//! Plan computation shared by all resource types.
//!
//! A plan compares the prior state with the proposed state attribute by
//! attribute, using the resource's notion of equivalence, and reports
//! whether the change needs a replacement.

use serde_json::{Map, Value};

use super::Resource;
use crate::types::{AttributeChange, PlanResult};

/// The attribute every resource computes.
pub const ID_ATTRIBUTE: &str = "id";

/// Plan the transition from `prior` to `proposed` for `resource`.
///
/// - no prior state: create, with `id` computed from the proposal
/// - `proposed` is `null`: destroy, every prior attribute is removed
/// - otherwise: update in place, or replace when a `force_new` attribute
///   changes. Values the resource considers equivalent keep their prior
///   form and produce no change.
pub fn plan_resource(resource: &dyn Resource, prior: Option<Value>, proposed: Value) -> PlanResult {
    match (prior, proposed) {
        (None, Value::Null) => PlanResult::no_change(Value::Null),
        (None, proposed) => plan_create(resource, proposed),
        (Some(prior), Value::Null) => plan_destroy(prior),
        (Some(prior), proposed) => plan_update(resource, prior, proposed),
    }
}

fn plan_create(resource: &dyn Resource, proposed: Value) -> PlanResult {
    let mut planned = into_object(proposed);
    let id = resource.planned_id(&Value::Object(planned.clone()));
    planned.insert(
        ID_ATTRIBUTE.to_string(),
        id.map(Value::String).unwrap_or(Value::Null),
    );

    let changes = sorted_keys(&planned)
        .into_iter()
        .filter_map(|name| {
            let value = &planned[name.as_str()];
            (!value.is_null()).then(|| AttributeChange::added(name.clone(), value.clone()))
        })
        .collect();

    PlanResult::with_changes(Value::Object(planned), changes, false)
}

fn plan_destroy(prior: Value) -> PlanResult {
    let prior = into_object(prior);
    let changes = sorted_keys(&prior)
        .into_iter()
        .filter_map(|name| {
            let value = &prior[name.as_str()];
            (!value.is_null()).then(|| AttributeChange::removed(name.clone(), value.clone()))
        })
        .collect();

    PlanResult::with_changes(Value::Null, changes, false)
}

fn plan_update(resource: &dyn Resource, prior: Value, proposed: Value) -> PlanResult {
    let schema = resource.schema();
    let prior = into_object(prior);
    let mut planned = into_object(proposed);

    let mut changes = Vec::new();
    let mut requires_replace = false;

    let mut names: Vec<&String> = schema.block.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &schema.block.attributes[name];
        if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
            continue;
        }

        let before = normalize(prior.get(name.as_str()));
        let after = normalize(planned.get(name.as_str()));
        if before == after {
            continue;
        }
        if resource.equivalent(name, &before, &after) {
            planned.insert(name.clone(), before);
            continue;
        }

        requires_replace |= attr.force_new;
        changes.push(AttributeChange::new(
            name.clone(),
            (!before.is_null()).then_some(before),
            (!after.is_null()).then_some(after),
        ));
    }

    let prior_id = prior.get(ID_ATTRIBUTE).cloned().unwrap_or(Value::Null);
    let id = if requires_replace || prior_id.is_null() {
        resource
            .planned_id(&Value::Object(planned.clone()))
            .map(Value::String)
            .unwrap_or(Value::Null)
    } else {
        prior_id.clone()
    };
    if id != prior_id {
        changes.push(AttributeChange::new(
            ID_ATTRIBUTE,
            (!prior_id.is_null()).then_some(prior_id),
            (!id.is_null()).then(|| id.clone()),
        ));
    }
    planned.insert(ID_ATTRIBUTE.to_string(), id);

    PlanResult::with_changes(Value::Object(planned), changes, requires_replace)
}

/// Absent and `null` mean the same thing.
fn normalize(value: Option<&Value>) -> Value {
    value.cloned().unwrap_or(Value::Null)
}

fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn sorted_keys(map: &Map<String, Value>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{AlertmanagerResource, RulesResource};
    use serde_json::json;

    const CONTENT: &str = "groups:\n  - name: cpu\n    rules:\n      - record: r\n        expr: up\n";
    const CONTENT_REFORMATTED: &str =
        "groups: [{name: cpu, rules: [{record: r, expr: up}]}]\n";

    fn rules_state() -> Value {
        json!({
            "namespace": "infra",
            "content": CONTENT,
            "tenant_id": "team-a",
            "id": "team-a/infra",
        })
    }

    #[test]
    fn test_create_computes_id() {
        let plan = plan_resource(
            &RulesResource,
            None,
            json!({"namespace": "infra", "content": CONTENT, "tenant_id": null}),
        );
        assert_eq!(plan.planned_state["id"], "infra");
        assert!(!plan.requires_replace);
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["content", "id", "namespace"]);
    }

    #[test]
    fn test_no_change() {
        let plan = plan_resource(&RulesResource, Some(rules_state()), rules_state());
        assert!(!plan.has_changes());
        assert_eq!(plan.planned_state, rules_state());
    }

    #[test]
    fn test_equivalent_content_is_suppressed() {
        let mut proposed = rules_state();
        proposed["content"] = json!(CONTENT_REFORMATTED);
        proposed.as_object_mut().unwrap().remove("id");

        let plan = plan_resource(&RulesResource, Some(rules_state()), proposed);
        assert!(!plan.has_changes());
        assert_eq!(plan.planned_state["content"], CONTENT);
        assert_eq!(plan.planned_state["id"], "team-a/infra");
    }

    #[test]
    fn test_content_change_updates_in_place() {
        let mut proposed = rules_state();
        proposed["content"] = json!(CONTENT.replace("expr: up", "expr: up == 0"));

        let plan = plan_resource(&RulesResource, Some(rules_state()), proposed);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "content");
        assert!(!plan.requires_replace);
    }

    #[test]
    fn test_force_new_change_replaces_and_recomputes_id() {
        let mut proposed = rules_state();
        proposed["tenant_id"] = json!("team-b");

        let plan = plan_resource(&RulesResource, Some(rules_state()), proposed);
        assert!(plan.requires_replace);
        assert_eq!(plan.planned_state["id"], "team-b/infra");
        let paths: Vec<_> = plan.changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["tenant_id", "id"]);
    }

    #[test]
    fn test_empty_tenant_is_the_default_tenant() {
        let prior = json!({
            "namespace": "infra",
            "content": CONTENT,
            "tenant_id": null,
            "id": "infra",
        });
        let mut proposed = prior.clone();
        proposed["tenant_id"] = json!("");

        let plan = plan_resource(&RulesResource, Some(prior.clone()), proposed);
        assert!(!plan.requires_replace);
        assert!(!plan.has_changes());
        assert_eq!(plan.planned_state, prior);

        let prior = json!({
            "config_yaml": "route: {receiver: x}",
            "templates": null,
            "tenant_id": "",
            "id": "default",
        });
        let mut proposed = prior.clone();
        proposed["tenant_id"] = Value::Null;

        let plan = plan_resource(&AlertmanagerResource, Some(prior), proposed);
        assert!(!plan.requires_replace);
        assert!(!plan.has_changes());
        assert_eq!(plan.planned_state["id"], "default");
    }

    #[test]
    fn test_destroy() {
        let plan = plan_resource(&RulesResource, Some(rules_state()), Value::Null);
        assert!(plan.planned_state.is_null());
        assert_eq!(plan.changes.len(), 4);
        assert!(plan.changes.iter().all(|c| c.after.is_none()));
    }

    #[test]
    fn test_nothing_to_nothing() {
        let plan = plan_resource(&AlertmanagerResource, None, Value::Null);
        assert!(!plan.has_changes());
        assert!(plan.planned_state.is_null());
    }

    #[test]
    fn test_alertmanager_templates_removed() {
        let prior = json!({
            "config_yaml": "route: {receiver: x}",
            "templates": {"a.tmpl": "x"},
            "tenant_id": null,
            "id": "default",
        });
        let proposed = json!({
            "config_yaml": "route:\n  receiver: x\n",
            "templates": null,
            "tenant_id": null,
        });

        let plan = plan_resource(&AlertmanagerResource, Some(prior), proposed);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "templates");
        assert!(plan.changes[0].after.is_none());
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["config_yaml"], "route: {receiver: x}");
    }
}
