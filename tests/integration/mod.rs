mod teardown;
mod timeouts;
