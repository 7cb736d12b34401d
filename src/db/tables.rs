use redb::TableDefinition;

/// Every keyed record lives in one table; namespacing is done by key prefix.
pub const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
