mod operations_test;
mod secrets_test;
mod service_test;
