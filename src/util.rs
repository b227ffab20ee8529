use anyhow::Result;
use aws_sdk_ecs::primitives::DateTime;
use futures::{Stream, stream};
use std::future::Future;

pub const UNKNOWN_REVISION: &str = "unknown";

const SEPARATOR: &str =
    "-----------------------------------------------------------------------------------------------";

/// Ends after a page without a next token, or after the first error.
pub fn stream_paginated<C, S, T, F, Fut>(
    client: C,
    state: S,
    f: F,
) -> impl Stream<Item = Result<T>>
where
    C: Clone,
    F: Fn(C, S, Option<String>) -> Fut,
    Fut: Future<Output = Result<(T, S, Option<String>)>>,
{
    stream::unfold(Some((state, None)), move |next| {
        let fut = next.map(|(state, token)| f(client.clone(), state, token));
        async move {
            match fut?.await {
                Ok((page, state, token)) => Some((Ok(page), token.map(|t| (state, Some(t))))),
                Err(e) => Some((Err(e), None)),
            }
        }
    })
}

/// `.../task-definition/demo:8` yields `demo:8`.
pub fn revision_key(task_definition: &str) -> &str {
    match task_definition.rsplit_once('/') {
        Some((_, key)) => key,
        None => UNKNOWN_REVISION,
    }
}

pub fn print_separator() {
    println!("{SEPARATOR}");
}

pub fn format_timestamp(at: &DateTime) -> String {
    chrono::DateTime::from_timestamp(at.secs(), at.subsec_nanos())
        .map(|t| t.format("%Y-%m-%d %H:%M:%S %Z").to_string())
        .unwrap_or_else(|| at.secs().to_string())
}
