use super::{ChargeDriver, DriverCommand};

impl ChargeDriver {
    /// Returns true when a cycle was run
    pub(crate) async fn handle_command(&mut self, cmd: DriverCommand) -> bool {
        match cmd {
            DriverCommand::ForceRefresh { correlation_id } => {
                self.logger
                    .with_correlation_id(correlation_id.as_deref())
                    .debug("Force refresh requested");
                self.execute_cycle(correlation_id).await;
                true
            }
            DriverCommand::SetSafeMode(enabled) => {
                self.logger.info(&format!(
                    "Safe mode {} by command",
                    if enabled { "enabled" } else { "disabled" }
                ));
                self.safe_mode_override = Some(enabled);
                false
            }
        }
    }
}
