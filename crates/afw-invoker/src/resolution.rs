use afw_operation::{OperationKey, OperationResolver};
use serde_json::Value;

/// Candidates for `key` that accept `input`, in precedence order.
///
/// The sort is stable: within a position bucket, registration order wins.
pub(crate) fn order_candidates(
    resolvers: Vec<OperationResolver>,
    key: &OperationKey,
    input: &Value,
) -> Vec<OperationResolver> {
    let mut candidates: Vec<_> = resolvers
        .into_iter()
        .filter(|resolver| resolver.key() == key && resolver.accepts(input))
        .collect();
    candidates.sort_by_key(OperationResolver::position);
    candidates
}

pub(crate) fn select_resolver(
    resolvers: Vec<OperationResolver>,
    key: &OperationKey,
    input: &Value,
) -> Option<OperationResolver> {
    order_candidates(resolvers, key, input).into_iter().next()
}
