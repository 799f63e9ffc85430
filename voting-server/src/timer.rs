use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::sleep};
use tracing::info;

use crate::hub::Hub;

/// Ends the vote after `duration`: broadcasts the final tallies and sets the
/// hub's stop flag. Runs once per server; the returned handle is only used to
/// abort it on early shutdown.
pub fn spawn(hub: Arc<Hub>, duration: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(duration).await;
        info!("voting time is over");
        hub.finish().await;
    })
}
