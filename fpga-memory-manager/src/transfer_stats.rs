use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
}

/// Running totals for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTotals {
    pub transfers: u64,
    pub bytes: u64,
}

/// Bookkeeping of host/device copies.
///
/// Copies are synchronous, so this only records what happened; it is shared
/// behind `&self` by platforms that hand out `Arc` handles.
#[derive(Debug, Default)]
pub struct TransferStats {
    h2d: Mutex<TransferTotals>,
    d2h: Mutex<TransferTotals>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, direction: TransferDirection, address: u64, size: u64) {
        let (label, totals) = match direction {
            TransferDirection::HostToDevice => ("HtoD", &self.h2d),
            TransferDirection::DeviceToHost => ("DtoH", &self.d2h),
        };
        debug!("{} transfer: {} bytes at {:#x}", label, size, address);
        let mut totals = totals.lock();
        totals.transfers += 1;
        totals.bytes += size;
    }

    pub fn totals(&self, direction: TransferDirection) -> TransferTotals {
        match direction {
            TransferDirection::HostToDevice => *self.h2d.lock(),
            TransferDirection::DeviceToHost => *self.d2h.lock(),
        }
    }

    pub fn total_transfers(&self) -> u64 {
        self.h2d.lock().transfers + self.d2h.lock().transfers
    }
}
