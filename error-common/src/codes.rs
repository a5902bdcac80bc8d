// Standardized error codes surfaced to API callers and logs

pub mod validation {
    pub const INVALID_INPUT: &str = "VALIDATION_1001";
    pub const MISSING_REQUIRED_FIELD: &str = "VALIDATION_1002";
    pub const INVALID_FORMAT: &str = "VALIDATION_1003";
    pub const NEGATIVE_AMOUNT: &str = "VALIDATION_1004";
    pub const UNKNOWN_CONSULTATION_TYPE: &str = "VALIDATION_1005";
}

pub mod billing {
    pub const AMOUNT_MISMATCH: &str = "BILLING_5001";
    pub const INVALID_SCHEDULE: &str = "BILLING_5002";
    pub const REFUND_EXCEEDS_AVAILABLE: &str = "BILLING_5003";
    pub const INVOICE_NOT_PAYABLE: &str = "BILLING_5101";
    pub const ALREADY_TERMINAL: &str = "BILLING_5102";
    pub const REASSIGNMENT_BLOCKED: &str = "BILLING_5103";
    pub const INVOICE_NOT_FOUND: &str = "BILLING_5201";
    pub const PATIENT_NOT_FOUND: &str = "BILLING_5202";
}

pub mod concurrency {
    pub const VERSION_CONFLICT: &str = "CONCURRENCY_6001";
}

pub mod database {
    pub const CONNECTION_FAILED: &str = "DB_4001";
    pub const QUERY_FAILED: &str = "DB_4002";
    pub const CONSTRAINT_VIOLATION: &str = "DB_4003";
}

pub mod configuration {
    pub const INVALID_CONFIG: &str = "CONFIG_7001";
}
