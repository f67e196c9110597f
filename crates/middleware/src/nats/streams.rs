use crate::queue::parent_queue;

/// Suffix of the JetStream stream that backs a queue's dead-letter sub-queue
pub const DEAD_LETTER_STREAM_SUFFIX: &str = "_DLQ";

/// Replace characters JetStream does not allow in stream names with `_`
pub fn sanitize_stream_token(token: &str) -> String {
    token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | '\\' | '$' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Stream name for a queue path: `orders` -> `orders`,
/// `orders/$DeadLetterQueue` -> `orders_DLQ`
pub fn stream_name_for_path(queue_path: &str) -> String {
    match parent_queue(queue_path) {
        Some(parent) => format!("{}{}", sanitize_stream_token(parent), DEAD_LETTER_STREAM_SUFFIX),
        None => sanitize_stream_token(queue_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_queue() {
        assert_eq!(stream_name_for_path("ORDERS"), "ORDERS");
    }

    #[test]
    fn test_dead_letter_queue() {
        assert_eq!(stream_name_for_path("ORDERS/$DeadLetterQueue"), "ORDERS_DLQ");
    }

    #[test]
    fn test_sanitize_invalid_characters() {
        assert_eq!(sanitize_stream_token("prod.orders v2/*"), "prod_orders_v2__");
    }

    #[test]
    fn test_nested_path() {
        assert_eq!(
            stream_name_for_path("billing/invoices/$DeadLetterQueue"),
            "billing_invoices_DLQ"
        );
    }
}
