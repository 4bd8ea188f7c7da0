//! The process-wide bus picks up configuration on first use.

use figment::Jail;

#[test]
fn global_bus_is_configured_from_environment() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "codebus.toml",
            r#"
            [bus]
            cache_capacity = 3

            [logging]
            output = "stderr"
            "#,
        )?;
        jail.set_env("CODEBUS_BUS__VALIDATE_ARGUMENTS", "false");

        let bus = codebus::global();
        assert!(!bus.validation());
        assert_eq!(bus.cache().capacity(), 3);
        assert!(std::ptr::eq(bus, codebus::global()));
        assert!(tracing::dispatcher::has_been_set());
        Ok(())
    });
}
