/*!
 * Target Process
 * Seam to the suspended child that receives the interception buffer
 */

use super::types::{InterceptionError, InterceptionResult};
use crate::core::types::Address;
use bytes::Bytes;
use tracing::debug;

/// Suspended target process
pub trait TargetProcess {
    /// Load address of the target's main executable; symbolic interceptors
    /// are exported from it
    fn main_module(&self) -> Address;

    /// Copy `config` into the target, returning its remote address
    fn transfer_config(&mut self, config: &[u8]) -> InterceptionResult<Address>;
}

/// In-memory target that records every transfer
#[derive(Debug, Clone)]
pub struct SimulatedTarget {
    main_module: Address,
    next_address: Address,
    transfers: Vec<(Address, Bytes)>,
    fail_transfers: bool,
}

impl SimulatedTarget {
    const ALLOCATION_BASE: Address = 0x0000_0200_0000_0000;
    const ALLOCATION_GRANULARITY: Address = 0x1_0000;

    pub fn new(main_module: Address) -> Self {
        Self {
            main_module,
            next_address: Self::ALLOCATION_BASE,
            transfers: Vec::new(),
            fail_transfers: false,
        }
    }

    /// Make every later transfer fail, as if the target had died
    pub fn fail_transfers(&mut self) {
        self.fail_transfers = true;
    }

    pub fn transfers(&self) -> &[(Address, Bytes)] {
        &self.transfers
    }

    pub fn last_transfer(&self) -> Option<&Bytes> {
        self.transfers.last().map(|(_, bytes)| bytes)
    }
}

impl TargetProcess for SimulatedTarget {
    fn main_module(&self) -> Address {
        self.main_module
    }

    fn transfer_config(&mut self, config: &[u8]) -> InterceptionResult<Address> {
        if self.fail_transfers {
            return Err(InterceptionError::Transfer(
                "target process is not accepting writes".into(),
            ));
        }

        let address = self.next_address;
        let pages = (config.len() as Address).div_ceil(Self::ALLOCATION_GRANULARITY).max(1);
        self.next_address += pages * Self::ALLOCATION_GRANULARITY;
        self.transfers.push((address, Bytes::copy_from_slice(config)));

        debug!(address, bytes = config.len(), "Transferred config to simulated target");
        Ok(address)
    }
}
