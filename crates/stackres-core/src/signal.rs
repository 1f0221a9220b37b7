//! Signal acceptance and application.
//!
//! `check` runs synchronously when a signal arrives and decides between
//! rejecting it and accepting it. `deliver` applies an accepted signal to
//! the stored stack; callers run it in the background.

use crate::config::Config;
use crate::error::{Result, StackError};
use crate::identity::ResourceKey;
use crate::lifecycle;
use crate::registry::{self, SignalHandler};
use crate::resource::Resource;
use crate::stack::Stack;
use crate::template::reference_target;
use crate::types::{Action, ResourceStatus, Status};
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::path::Path;

/// What a handler sees while applying a signal.
pub struct SignalContext<'a> {
    pub stack: &'a mut Stack,
    pub resource_name: &'a str,
    pub payload: &'a Value,
}

/// Decide whether `resource_name` may receive `payload` right now.
pub fn check(stack: &Stack, resource_name: &str, payload: &Value) -> Result<&'static SignalHandler> {
    let resource = stack.resource(resource_name)?;
    let kind = registry::lookup(&resource.resource_type);
    let Some(handler) = kind.signal.as_ref() else {
        return Err(StackError::SignalNotSupported {
            resource: resource.name.clone(),
            resource_type: resource.resource_type.clone(),
        });
    };
    if matches!(
        resource.status.action,
        Action::Init | Action::Delete | Action::Suspend
    ) {
        return Err(StackError::SignalRejected {
            resource: resource.name.clone(),
            action: resource.status.to_string(),
        });
    }
    (handler.validate)(stack, resource, payload)?;
    Ok(handler)
}

/// Apply a signal to an in-memory stack. The `SIGNAL_COMPLETE` event is
/// recorded ahead of any events the handler produced.
pub fn apply(stack: &mut Stack, resource_name: &str, payload: &Value) -> Result<String> {
    let handler = check(stack, resource_name, payload)?;
    let mark = stack.events.len();

    let mut ctx = SignalContext {
        stack: &mut *stack,
        resource_name,
        payload,
    };
    let reason = (handler.apply)(&mut ctx)?;

    let resource = stack.resource_mut(resource_name)?;
    resource.touch();
    let event = resource.event(ResourceStatus::new(Action::Signal, Status::Complete), &reason);
    stack.events.insert(mark, event);
    stack.updated_at = Utc::now();
    Ok(reason)
}

/// Load, apply, continue any creation the signal unblocked, persist, and
/// propagate completion to parent stacks.
pub fn deliver(root: &Path, config: &Config, key: &ResourceKey, payload: &Value) -> Result<String> {
    key.validate()?;
    let mut stack = Stack::lookup(root, &key.stack)?;
    let reason = apply(&mut stack, &key.resource_name, payload)?;
    lifecycle::provision(root, config, &mut stack)?;
    stack.save(root)?;
    lifecycle::propagate_to_parent(root, config, &stack)?;
    tracing::info!(resource = %key, %reason, "signal applied");
    Ok(reason)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Integers in templates are often written as strings.
pub(crate) fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn invalid(msg: impl Into<String>) -> StackError {
    StackError::InvalidSignal(msg.into())
}

// ---------------------------------------------------------------------------
// Wait condition handles
// ---------------------------------------------------------------------------

const WAIT_KEYS: [&str; 4] = ["Data", "Reason", "Status", "UniqueId"];
const SUCCESS: &str = "SUCCESS";
const FAILURE: &str = "FAILURE";

pub fn validate_wait_handle(_stack: &Stack, _resource: &Resource, payload: &Value) -> Result<()> {
    let obj = payload
        .as_object()
        .ok_or_else(|| invalid("wait condition signal must be an object"))?;
    for key in WAIT_KEYS {
        if !obj.contains_key(key) {
            return Err(invalid(format!("wait condition signal is missing '{key}'")));
        }
    }
    match obj.get("Status").and_then(Value::as_str) {
        Some(SUCCESS) | Some(FAILURE) => {}
        _ => return Err(invalid("Status must be SUCCESS or FAILURE")),
    }
    match obj.get("UniqueId") {
        Some(Value::String(_)) | Some(Value::Number(_)) => Ok(()),
        _ => Err(invalid("UniqueId must be a string or a number")),
    }
}

fn unique_id(payload: &Value) -> String {
    match payload.get("UniqueId") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

pub fn apply_wait_handle(ctx: &mut SignalContext) -> Result<String> {
    let id = unique_id(ctx.payload);
    let entry: serde_json::Map<String, Value> = WAIT_KEYS
        .iter()
        .filter_map(|k| ctx.payload.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
    let status = entry.get("Status").and_then(Value::as_str).unwrap_or_default().to_string();
    let reason = entry.get("Reason").and_then(Value::as_str).unwrap_or_default().to_string();

    ctx.stack
        .resource_mut(ctx.resource_name)?
        .metadata_mut()
        .insert(id, Value::Object(entry));

    evaluate_waiters(ctx.stack, ctx.resource_name)?;
    Ok(format!("Signal: status:{status} reason:{reason}"))
}

/// Complete or fail every pending wait condition that listens on `handle`.
fn evaluate_waiters(stack: &mut Stack, handle: &str) -> Result<()> {
    let signals: Vec<Value> = stack
        .resource(handle)?
        .metadata
        .as_object()
        .map(|m| m.values().cloned().collect())
        .unwrap_or_default();
    let failures: Vec<String> = signals
        .iter()
        .filter(|s| s.get("Status").and_then(Value::as_str) == Some(FAILURE))
        .map(|s| s.get("Reason").and_then(Value::as_str).unwrap_or_default().to_string())
        .collect();
    let successes = signals
        .iter()
        .filter(|s| s.get("Status").and_then(Value::as_str) == Some(SUCCESS))
        .count();

    let in_progress = ResourceStatus::new(Action::Create, Status::InProgress);
    let waiters: Vec<(String, usize)> = stack
        .resources
        .iter()
        .filter(|r| registry::is_type(&r.resource_type, registry::WAIT_CONDITION))
        .filter(|r| r.status == in_progress)
        .filter(|r| r.property("Handle").and_then(reference_target) == Some(handle))
        .map(|r| {
            let count = r.property("Count").and_then(as_int).unwrap_or(1).max(1);
            (r.name.clone(), count as usize)
        })
        .collect();

    for (name, count) in waiters {
        if !failures.is_empty() {
            stack.set_resource_state(&name, Action::Create, Status::Failed, failures.join(";"))?;
        } else if successes >= count {
            stack.set_resource_state(
                &name,
                Action::Create,
                Status::Complete,
                format!("Received {successes} of {count} expected signals"),
            )?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scaling policies
// ---------------------------------------------------------------------------

const ADJUSTMENT_TYPES: [&str; 3] = [
    "ChangeInCapacity",
    "ExactCapacity",
    "PercentChangeInCapacity",
];

fn scaling_group_name(policy: &Resource) -> Option<&str> {
    policy
        .property("AutoScalingGroupName")
        .or_else(|| policy.property("auto_scaling_group_id"))
        .and_then(reference_target)
}

fn adjustment_type(policy: &Resource) -> &str {
    policy
        .property("AdjustmentType")
        .or_else(|| policy.property("adjustment_type"))
        .and_then(Value::as_str)
        .unwrap_or("ChangeInCapacity")
}

fn scaling_adjustment(policy: &Resource) -> Option<i64> {
    policy
        .property("ScalingAdjustment")
        .or_else(|| policy.property("scaling_adjustment"))
        .and_then(as_int)
}

pub fn validate_scaling_policy(stack: &Stack, policy: &Resource, payload: &Value) -> Result<()> {
    match payload {
        Value::Null => {}
        Value::Object(obj) => {
            if let Some(state) = obj.get("state") {
                if !state.is_string() {
                    return Err(invalid("state must be a string"));
                }
            }
        }
        _ => return Err(invalid("scaling policy signal must be an object")),
    }

    let group = scaling_group_name(policy)
        .ok_or_else(|| invalid(format!("policy '{}' names no scaling group", policy.name)))?;
    let group = stack.resource(group)?;
    if !registry::is_type(&group.resource_type, registry::SCALING_GROUP) {
        return Err(invalid(format!("'{}' is not a scaling group", group.name)));
    }
    ensure_group_created(group)?;
    if scaling_adjustment(policy).is_none() {
        return Err(invalid(format!(
            "policy '{}' has no integer ScalingAdjustment",
            policy.name
        )));
    }
    if !ADJUSTMENT_TYPES.contains(&adjustment_type(policy)) {
        return Err(invalid(format!(
            "unknown AdjustmentType '{}'",
            adjustment_type(policy)
        )));
    }
    if let Some(raw) = policy.property("Cooldown") {
        match as_int(raw) {
            Some(secs) if secs >= 0 && TimeDelta::try_seconds(secs).is_some() => {}
            _ => {
                return Err(invalid(format!(
                    "policy '{}' has an out of range Cooldown",
                    policy.name
                )))
            }
        }
    }
    Ok(())
}

/// A group can only be adjusted once it exists.
fn ensure_group_created(group: &Resource) -> Result<()> {
    if group.is_created() {
        return Ok(());
    }
    Err(StackError::SignalRejected {
        resource: group.name.clone(),
        action: group.status.to_string(),
    })
}

fn current_capacity(group: &Resource) -> i64 {
    group
        .metadata
        .get("desired_capacity")
        .and_then(as_int)
        .or_else(|| group.property("DesiredCapacity").and_then(as_int))
        .or_else(|| group.property("MinSize").and_then(as_int))
        .unwrap_or(0)
}

/// New capacity for an adjustment, clamped to `[min, max]`.
pub fn adjusted_capacity(
    current: i64,
    adjustment: i64,
    adjustment_type: &str,
    min: i64,
    max: Option<i64>,
) -> i64 {
    let target = match adjustment_type {
        "ExactCapacity" => adjustment,
        "PercentChangeInCapacity" => {
            let delta = current as f64 * adjustment as f64 / 100.0;
            let delta = if delta > 0.0 && delta < 1.0 {
                1
            } else if delta < 0.0 && delta > -1.0 {
                -1
            } else {
                delta.trunc() as i64
            };
            current.saturating_add(delta)
        }
        _ => current.saturating_add(adjustment),
    };
    let target = target.max(min);
    match max {
        Some(max) => target.min(max.max(min)),
        None => target,
    }
}

pub fn apply_scaling_policy(ctx: &mut SignalContext) -> Result<String> {
    if let Some(state) = ctx.payload.get("state").and_then(Value::as_str) {
        if !state.eq_ignore_ascii_case("alarm") {
            return Ok(format!("Signal: alarm state is {state}, ignoring"));
        }
    }

    let now = Utc::now();
    let policy = ctx.stack.resource(ctx.resource_name)?;
    let cooldown = policy.property("Cooldown").and_then(as_int).unwrap_or(0);
    let last: Option<DateTime<Utc>> = policy
        .metadata
        .get("last_adjustment_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    if let Some(last) = last {
        // An end past the representable range never elapses.
        let cooling = cooldown > 0
            && TimeDelta::try_seconds(cooldown)
                .and_then(|d| last.checked_add_signed(d))
                .is_none_or(|until| now < until);
        if cooling {
            return Ok("Signal: cooldown in effect, ignoring".to_string());
        }
    }

    let group_name = scaling_group_name(policy)
        .ok_or_else(|| invalid("policy names no scaling group"))?
        .to_string();
    let adjustment = scaling_adjustment(policy).unwrap_or(0);
    let kind = adjustment_type(policy).to_string();

    let group = ctx.stack.resource(&group_name)?;
    ensure_group_created(group)?;
    let from = current_capacity(group);
    let min = group.property("MinSize").and_then(as_int).unwrap_or(0);
    let max = group.property("MaxSize").and_then(as_int);
    let to = adjusted_capacity(from, adjustment, &kind, min, max);

    let reason = format!("Scaling {group_name} from {from} to {to}");
    ctx.stack
        .set_resource_state(&group_name, Action::Update, Status::InProgress, &reason)?;
    ctx.stack
        .resource_mut(&group_name)?
        .metadata_mut()
        .insert("desired_capacity".to_string(), Value::from(to));
    ctx.stack
        .set_resource_state(&group_name, Action::Update, Status::Complete, &reason)?;

    let meta = ctx.stack.resource_mut(ctx.resource_name)?.metadata_mut();
    meta.insert("last_adjustment_at".to_string(), Value::from(now.to_rfc3339()));
    meta.insert(
        "last_adjustment".to_string(),
        serde_json::json!({ "from": from, "to": to }),
    );

    Ok(format!("Signal: adjusted {group_name} capacity from {from} to {to}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;
    use serde_json::json;

    fn stack_from(src: &str) -> Stack {
        let tmpl = Template::parse(src).unwrap();
        let mut stack = Stack::new("t1", "test_stack");
        for def in &tmpl.resources {
            stack.add_resource(Resource::from_definition(def)).unwrap();
        }
        for r in stack.resources.clone() {
            let action = if registry::is_type(&r.resource_type, registry::WAIT_CONDITION) {
                None
            } else {
                Some(Status::Complete)
            };
            stack
                .set_resource_state(&r.name, Action::Create, Status::InProgress, "")
                .unwrap();
            if let Some(st) = action {
                stack.set_resource_state(&r.name, Action::Create, st, "").unwrap();
            }
        }
        stack
    }

    const WAIT: &str = r#"{"Resources": {
        "handle": {"Type": "AWS::CloudFormation::WaitConditionHandle"},
        "waiter": {"Type": "AWS::CloudFormation::WaitCondition",
                   "Properties": {"Handle": {"Ref": "handle"}, "Count": "2"}},
        "server": {"Type": "AWS::EC2::Instance"}
    }}"#;

    fn wait_signal(id: &str, status: &str) -> Value {
        json!({"Status": status, "Reason": format!("r{id}"), "UniqueId": id, "Data": "x"})
    }

    #[test]
    fn generic_resource_rejects_signal() {
        let stack = stack_from(WAIT);
        let err = check(&stack, "server", &json!({})).unwrap_err();
        assert!(matches!(err, StackError::SignalNotSupported { .. }));
        let err = check(&stack, "waiter", &json!({})).unwrap_err();
        assert!(matches!(err, StackError::SignalNotSupported { .. }));
    }

    #[test]
    fn missing_resource_is_not_found() {
        let stack = stack_from(WAIT);
        assert!(matches!(
            check(&stack, "ghost", &Value::Null),
            Err(StackError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn wait_handle_payload_is_validated() {
        let stack = stack_from(WAIT);
        assert!(check(&stack, "handle", &json!({"Status": "SUCCESS"})).is_err());
        assert!(check(&stack, "handle", &wait_signal("1", "MAYBE")).is_err());
        assert!(check(&stack, "handle", &wait_signal("1", "SUCCESS")).is_ok());
    }

    #[test]
    fn deleting_resource_rejects_signal() {
        let mut stack = stack_from(WAIT);
        stack
            .set_resource_state("handle", Action::Delete, Status::InProgress, "")
            .unwrap();
        assert!(matches!(
            check(&stack, "handle", &wait_signal("1", "SUCCESS")),
            Err(StackError::SignalRejected { .. })
        ));
    }

    #[test]
    fn uncreated_handle_rejects_signal() {
        let mut stack = stack_from(WAIT);
        stack.resource_mut("handle").unwrap().status = ResourceStatus::init();
        assert!(matches!(
            check(&stack, "handle", &wait_signal("1", "SUCCESS")),
            Err(StackError::SignalRejected { .. })
        ));
    }

    #[test]
    fn waiter_completes_after_count_successes() {
        let mut stack = stack_from(WAIT);
        apply(&mut stack, "handle", &wait_signal("1", "SUCCESS")).unwrap();
        assert_eq!(
            stack.resource("waiter").unwrap().status.to_string(),
            "CREATE_IN_PROGRESS"
        );
        // Same UniqueId replaces rather than adds.
        apply(&mut stack, "handle", &wait_signal("1", "SUCCESS")).unwrap();
        assert_eq!(
            stack.resource("waiter").unwrap().status.to_string(),
            "CREATE_IN_PROGRESS"
        );
        let reason = apply(&mut stack, "handle", &wait_signal("2", "SUCCESS")).unwrap();
        assert_eq!(reason, "Signal: status:SUCCESS reason:r2");
        assert_eq!(
            stack.resource("waiter").unwrap().status.to_string(),
            "CREATE_COMPLETE"
        );
        assert_eq!(stack.resource("handle").unwrap().metadata["2"]["Data"], "x");
    }

    #[test]
    fn failure_fails_waiter() {
        let mut stack = stack_from(WAIT);
        apply(&mut stack, "handle", &wait_signal("1", "FAILURE")).unwrap();
        let waiter = stack.resource("waiter").unwrap();
        assert_eq!(waiter.status.to_string(), "CREATE_FAILED");
        assert_eq!(waiter.status_reason, "r1");
    }

    #[test]
    fn signal_event_precedes_handler_events() {
        let mut stack = stack_from(WAIT);
        let before = stack.events.len();
        apply(&mut stack, "handle", &wait_signal("1", "FAILURE")).unwrap();
        let new: Vec<_> = stack.events[before..]
            .iter()
            .map(|e| (e.resource_name.as_str(), e.resource_status.to_string()))
            .collect();
        assert_eq!(
            new,
            vec![
                ("handle", "SIGNAL_COMPLETE".to_string()),
                ("waiter", "CREATE_FAILED".to_string()),
            ]
        );
    }

    const SCALING: &str = r#"{"Resources": {
        "group": {"Type": "AWS::AutoScaling::AutoScalingGroup",
                  "Properties": {"MinSize": "1", "MaxSize": "3", "DesiredCapacity": "2"}},
        "up": {"Type": "AWS::AutoScaling::ScalingPolicy",
               "Properties": {"AutoScalingGroupName": {"Ref": "group"},
                              "AdjustmentType": "ChangeInCapacity",
                              "ScalingAdjustment": "5", "Cooldown": "60"}}
    }}"#;

    #[test]
    fn scaling_policy_adjusts_group_within_bounds() {
        let mut stack = stack_from(SCALING);
        apply(&mut stack, "up", &json!({"state": "alarm"})).unwrap();
        let group = stack.resource("group").unwrap();
        assert_eq!(group.metadata["desired_capacity"], 3);
        assert_eq!(group.status.to_string(), "UPDATE_COMPLETE");
    }

    #[test]
    fn scaling_policy_ignores_ok_state_and_cooldown() {
        let mut stack = stack_from(SCALING);
        let reason = apply(&mut stack, "up", &json!({"state": "ok"})).unwrap();
        assert!(reason.contains("ignoring"));
        assert_eq!(
            stack.resource("group").unwrap().status.to_string(),
            "CREATE_COMPLETE"
        );

        apply(&mut stack, "up", &Value::Null).unwrap();
        let reason = apply(&mut stack, "up", &Value::Null).unwrap();
        assert!(reason.contains("cooldown"));
    }

    #[test]
    fn scaling_policy_rejects_uncreated_group() {
        let mut stack = stack_from(SCALING);
        stack.resource_mut("group").unwrap().status = ResourceStatus::init();
        assert!(matches!(
            check(&stack, "up", &Value::Null),
            Err(StackError::SignalRejected { .. })
        ));
    }

    #[test]
    fn out_of_range_cooldown_is_rejected() {
        let mut stack = stack_from(SCALING);
        stack
            .resource_mut("up")
            .unwrap()
            .properties
            .as_object_mut()
            .unwrap()
            .insert("Cooldown".into(), json!("9223372036854775807"));
        assert!(matches!(
            check(&stack, "up", &Value::Null),
            Err(StackError::InvalidSignal(_))
        ));
        assert!(apply(&mut stack, "up", &Value::Null).is_err());
    }

    #[test]
    fn scaling_policy_rejects_bad_payload() {
        let stack = stack_from(SCALING);
        assert!(matches!(
            check(&stack, "up", &json!([1, 2])),
            Err(StackError::InvalidSignal(_))
        ));
        assert!(matches!(
            check(&stack, "up", &json!({"state": 3})),
            Err(StackError::InvalidSignal(_))
        ));
    }

    #[test]
    fn capacity_arithmetic() {
        assert_eq!(adjusted_capacity(2, 1, "ChangeInCapacity", 0, Some(10)), 3);
        assert_eq!(adjusted_capacity(2, -5, "ChangeInCapacity", 1, None), 1);
        assert_eq!(adjusted_capacity(2, 7, "ExactCapacity", 0, Some(5)), 5);
        assert_eq!(adjusted_capacity(4, 10, "PercentChangeInCapacity", 0, None), 5);
        assert_eq!(adjusted_capacity(4, -10, "PercentChangeInCapacity", 0, None), 3);
        assert_eq!(adjusted_capacity(10, 50, "PercentChangeInCapacity", 0, None), 15);
        assert_eq!(adjusted_capacity(i64::MAX, 1, "ChangeInCapacity", 0, None), i64::MAX);
        assert_eq!(adjusted_capacity(i64::MIN, -1, "ChangeInCapacity", i64::MIN, None), i64::MIN);
    }
}
