//! Recording provisioning service for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::command::{Asset, Slot};
use super::service::{PaverConnector, PaverError, PayloadStream, ProvisioningService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Asset(Slot, Asset, Vec<u8>),
    Firmware(Option<Slot>, String, Vec<u8>),
    DataFile(String, Vec<u8>),
    Volumes(Vec<u8>),
    InitPartitionTables,
    WipePartitionTables,
    SetActive(Slot),
    Flush,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    unavailable: bool,
    fail: bool,
    delay: Duration,
}

#[derive(Clone, Default)]
pub struct FakeConnector(Arc<Mutex<State>>);

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.0.lock().unwrap().unavailable = unavailable;
    }

    pub fn set_fail(&self, fail: bool) {
        self.0.lock().unwrap().fail = fail;
    }

    /// Make every provisioning call take at least `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.0.lock().unwrap().delay = delay;
    }
}

impl PaverConnector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn ProvisioningService>, PaverError> {
        if self.0.lock().unwrap().unavailable {
            return Err(PaverError::Unavailable);
        }
        Ok(Box::new(FakeService(self.0.clone())))
    }
}

struct FakeService(Arc<Mutex<State>>);

impl FakeService {
    fn record(&self, call: Call) -> Result<(), PaverError> {
        let delay = self.0.lock().unwrap().delay;
        std::thread::sleep(delay);
        let mut state = self.0.lock().unwrap();
        if state.fail {
            return Err(PaverError::Failed("injected".into()));
        }
        state.calls.push(call);
        Ok(())
    }
}

impl ProvisioningService for FakeService {
    fn write_asset(&mut self, slot: Slot, asset: Asset, payload: &[u8]) -> Result<(), PaverError> {
        self.record(Call::Asset(slot, asset, payload.to_vec()))
    }

    fn write_firmware(&mut self, slot: Option<Slot>, kind: &str, payload: &[u8]) -> Result<(), PaverError> {
        self.record(Call::Firmware(slot, kind.to_string(), payload.to_vec()))
    }

    fn write_data_file(&mut self, path: &str, payload: &[u8]) -> Result<(), PaverError> {
        self.record(Call::DataFile(path.to_string(), payload.to_vec()))
    }

    fn write_volumes(&mut self, stream: &mut dyn PayloadStream) -> Result<(), PaverError> {
        let mut image = Vec::new();
        let mut chunk = [0u8; 3000];
        loop {
            let n = stream.read_chunk(&mut chunk)?;
            if n == 0 {
                break;
            }
            image.extend_from_slice(&chunk[..n]);
        }
        self.record(Call::Volumes(image))
    }

    fn init_partition_tables(&mut self) -> Result<(), PaverError> {
        self.record(Call::InitPartitionTables)
    }

    fn wipe_partition_tables(&mut self) -> Result<(), PaverError> {
        self.record(Call::WipePartitionTables)
    }

    fn set_configuration_active(&mut self, slot: Slot) -> Result<(), PaverError> {
        self.record(Call::SetActive(slot))
    }

    fn flush(&mut self) -> Result<(), PaverError> {
        self.record(Call::Flush)
    }
}
