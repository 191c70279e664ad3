//! Database models for the inventory store.

/// Derive the per-bucket table name: every run of non-alphanumeric
/// characters in `bucket` is replaced by a single `_`, then the result is
/// prefixed with `bucket_`.
pub fn table_name(bucket: &str) -> String {
    let re = regex_lite::Regex::new("[^a-zA-Z0-9]+").expect("static pattern is valid");
    format!("bucket_{}", re.replace_all(bucket, "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_simple() {
        assert_eq!(table_name("my-data"), "bucket_my_data");
    }

    #[test]
    fn test_table_name_collapses_runs() {
        assert_eq!(table_name("a--b..c"), "bucket_a_b_c");
    }

    #[test]
    fn test_table_name_alphanumeric_passthrough() {
        assert_eq!(table_name("data123"), "bucket_data123");
    }

    #[test]
    fn test_table_name_leading_trailing_specials() {
        assert_eq!(table_name("-data-"), "bucket__data_");
    }

    #[test]
    fn test_table_name_empty_bucket() {
        assert_eq!(table_name(""), "bucket_");
    }
}
