//! TaskResult: one completed cycle, tagged with the task name.
//!
//! Wire shape is the flat tuple `(name, *payload)`. Results produced by a
//! runner also carry the id of the start that produced them, so a late
//! result of an earlier run is never counted against a newer one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{RunId, TaskName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    name: TaskName,

    #[serde(default)]
    payload: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    run: Option<RunId>,
}

impl TaskResult {
    pub fn new(name: TaskName, payload: Vec<Value>) -> Self {
        Self {
            name,
            payload,
            run: None,
        }
    }

    /// Build a result from a callable's return value.
    ///
    /// Arrays are spread into the payload; any other value becomes a
    /// single-element payload.
    pub fn from_return(name: TaskName, value: Value) -> Self {
        let payload = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        Self::new(name, payload)
    }

    /// Tag the result with the run that produced it.
    pub fn with_run(mut self, run: RunId) -> Self {
        self.run = Some(run);
        self
    }

    pub fn name(&self) -> &TaskName {
        &self.name
    }

    pub fn payload(&self) -> &[Value] {
        &self.payload
    }

    pub fn run(&self) -> Option<RunId> {
        self.run
    }

    pub fn into_parts(self) -> (TaskName, Vec<Value>) {
        (self.name, self.payload)
    }

    /// `[name, *payload]` as a JSON array.
    pub fn to_wire(&self) -> Value {
        let mut items = Vec::with_capacity(self.payload.len() + 1);
        items.push(Value::String(self.name.to_string()));
        items.extend(self.payload.iter().cloned());
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_return_is_spread() {
        let r = TaskResult::from_return("pair".into(), json!([1, "two"]));
        assert_eq!(r.payload(), &[json!(1), json!("two")]);
        assert_eq!(r.to_wire(), json!(["pair", 1, "two"]));
    }

    #[test]
    fn scalar_return_is_wrapped() {
        let r = TaskResult::from_return("text".into(), json!("hello"));
        assert_eq!(r.payload(), &[json!("hello")]);

        let r = TaskResult::from_return("obj".into(), json!({"k": 1}));
        assert_eq!(r.payload().len(), 1);
    }

    #[test]
    fn run_id_is_carried_but_not_part_of_the_wire_tuple() {
        let run = RunId::from_ulid(ulid::Ulid::new());
        let r = TaskResult::from_return("t".into(), json!(1)).with_run(run);
        assert_eq!(r.run(), Some(run));
        assert_eq!(r.to_wire(), json!(["t", 1]));
        assert!(TaskResult::from_return("t".into(), json!(1)).run().is_none());
    }

    #[test]
    fn null_return_still_produces_one_value() {
        let r = TaskResult::from_return("void".into(), Value::Null);
        assert_eq!(r.payload(), &[Value::Null]);
    }
}
