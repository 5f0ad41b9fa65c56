//! Boot-time provisioning: decides between joining the stored network and
//! opening the configuration portal, and persists what the operator enters.

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_storage::nor_flash::NorFlash;
use log::{error, info, warn};

use crate::config::{DeviceConfig, WifiCredentials};
use crate::constants::TRIGGER_DEBOUNCE_MS;
use crate::portal::{Portal, PortalError, Submission};
use crate::store::ConfigStore;

/// Joins a known network in station mode.
pub trait Network {
    async fn join(&mut self, credentials: &WifiCredentials) -> bool;
}

/// State of the provisioning trigger button, sampled once at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Held,
    Released,
}

/// Reads an active-low button. A pin that cannot be read counts as released.
pub fn sample_trigger<P: InputPin>(pin: &mut P) -> Trigger {
    match pin.is_low() {
        Ok(true) => Trigger::Held,
        _ => Trigger::Released,
    }
}

/// What the caller must do once provisioning is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootAction {
    /// The station is joined, carry on with the publish loop
    Continue,
    /// Reset the chip
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Idle,
    Provisioning,
    Joined,
    Failed,
}

pub struct Provisioner<W, D> {
    link: W,
    delay: D,
    state: ProvisioningState,
}

impl<W, D> Provisioner<W, D>
where
    W: Network + Portal,
    D: DelayNs,
{
    pub fn new(link: W, delay: D) -> Self {
        Self {
            link,
            delay,
            state: ProvisioningState::Idle,
        }
    }

    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    pub fn into_inner(self) -> W {
        self.link
    }

    /// Runs the boot flow.
    ///
    /// A held trigger always opens the portal and restarts afterwards. With a
    /// released trigger the portal only opens when the stored network cannot
    /// be joined. `config` and `credentials` hold the submitted values when
    /// this returns.
    pub async fn run<F: NorFlash>(
        &mut self,
        trigger: Trigger,
        config: &mut DeviceConfig,
        credentials: &mut WifiCredentials,
        store: &mut ConfigStore<F>,
    ) -> BootAction {
        if trigger == Trigger::Held {
            info!("Mode button pressed during boot. Starting AP mode...");
            self.delay.delay_ms(TRIGGER_DEBOUNCE_MS).await;

            return match self.provision(config, credentials, store).await {
                Ok(()) => BootAction::Restart,
                Err(_) => self.fail(),
            };
        }

        if !credentials.is_empty() && self.link.join(credentials).await {
            self.state = ProvisioningState::Joined;
            return BootAction::Continue;
        }

        warn!("Could not join a known network, starting configuration portal");
        if self.provision(config, credentials, store).await.is_err() {
            return self.fail();
        }

        if self.link.join(credentials).await {
            self.state = ProvisioningState::Joined;
            BootAction::Continue
        } else {
            self.fail()
        }
    }

    async fn provision<F: NorFlash>(
        &mut self,
        config: &mut DeviceConfig,
        credentials: &mut WifiCredentials,
        store: &mut ConfigStore<F>,
    ) -> Result<(), PortalError> {
        self.state = ProvisioningState::Provisioning;

        let Submission {
            config: submitted,
            credentials: submitted_credentials,
        } = self
            .link
            .run(config, credentials)
            .await
            .inspect_err(|e| error!("Configuration portal failed: {:?}", e))?;

        *config = submitted;
        *credentials = submitted_credentials;

        match store.save(config) {
            Ok(()) => info!("Config saved successfully."),
            Err(_) => error!("Failed to save config."),
        }
        if store.save_credentials(credentials).is_err() {
            error!("Failed to save Wi-Fi credentials.");
        }
        config.log();

        Ok(())
    }

    fn fail(&mut self) -> BootAction {
        error!("Failed to connect to WiFi. Restarting...");
        self.state = ProvisioningState::Failed;
        BootAction::Restart
    }
}
