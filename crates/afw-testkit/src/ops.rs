//! Sample operations shared by the invoker tests.

use std::time::Duration;

use afw_operation::{Operation, OperationResolver, UndoMapping};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Number {
    pub value: i64,
}

impl Number {
    pub fn new(value: i64) -> Self {
        Self { value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddInput {
    pub a: i64,
    pub b: i64,
}

/// Doubles its input after sleeping `value * 10` milliseconds.
pub fn compute() -> Operation<Number, Number> {
    Operation::new("test.compute").with_name("Compute")
}

/// Halves its input; the inverse of [`compute`].
pub fn halve() -> Operation<Number, Number> {
    Operation::new("test.halve").with_name("Halve")
}

pub fn add() -> Operation<AddInput, i64> {
    Operation::new("test.add")
}

/// Schedules [`compute`] as a followup and returns without waiting for it.
pub fn trigger_followup() -> Operation<Number, ()> {
    Operation::new("test.trigger-followup")
}

/// Always fails.
pub fn fail() -> Operation<(), ()> {
    Operation::new("test.fail")
}

pub fn compute_resolver() -> OperationResolver {
    OperationResolver::new(&compute(), |input: Number, _ctx| async move {
        let delay = u64::try_from(input.value).unwrap_or(0) * 10;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        anyhow::Ok(Number::new(input.value * 2))
    })
}

pub fn halve_resolver() -> OperationResolver {
    OperationResolver::sync(&halve(), |input: Number, _ctx| Ok(Number::new(input.value / 2)))
}

pub fn add_resolver() -> OperationResolver {
    OperationResolver::sync(&add(), |input: AddInput, _ctx| Ok(input.a + input.b))
}

pub fn trigger_followup_resolver() -> OperationResolver {
    OperationResolver::sync(&trigger_followup(), |input: Number, ctx| {
        ctx.schedule(&compute(), input)?;
        Ok(())
    })
}

pub fn fail_resolver() -> OperationResolver {
    OperationResolver::sync(&fail(), |_: (), _ctx| Err(anyhow!("boom")))
}

/// `compute` is undone by halving its output.
pub fn compute_undo() -> UndoMapping {
    UndoMapping::new(&compute(), &halve(), |_: &Number, output: &Number| Some(*output))
}

/// Every sample resolver, in registration order.
pub fn resolvers() -> Vec<OperationResolver> {
    vec![
        compute_resolver(),
        halve_resolver(),
        add_resolver(),
        trigger_followup_resolver(),
        fail_resolver(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compute_undo_derives_output_as_inverse_input() {
        let mapping = compute_undo();
        let derived = mapping.derive_context(&json!({ "value": 2 }), &json!({ "value": 4 }));
        assert_eq!(derived, Some(json!({ "value": 4 })));
        assert_eq!(mapping.inverse().key(), halve().key());
    }

    #[test]
    fn sample_keys_are_distinct() {
        let mut keys: Vec<_> = resolvers().iter().map(|r| r.key().clone()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), resolvers().len());
    }
}
