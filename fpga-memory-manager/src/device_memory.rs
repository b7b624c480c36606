//! Host-backed model of accelerator DDR.
//!
//! Regions are registered when the allocator hands out an address and get
//! their backing bytes on first write, so large reservations that are never
//! touched cost nothing.

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use tracing::trace;

#[derive(Debug)]
struct Region {
    size: u64,
    bytes: Vec<u8>,
}

impl Region {
    fn backing(&mut self) -> &mut Vec<u8> {
        if self.bytes.len() as u64 != self.size {
            self.bytes.resize(self.size as usize, 0);
        }
        &mut self.bytes
    }
}

#[derive(Debug, Default)]
pub struct DeviceMemory {
    regions: BTreeMap<u64, Region>,
}

impl DeviceMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `size` bytes at `address`. Overlapping regions are rejected.
    pub fn map(&mut self, address: u64, size: u64) -> Result<()> {
        let end = address
            .checked_add(size)
            .ok_or_else(|| anyhow::anyhow!("Region {:#x}+{} overflows", address, size))?;
        if let Some((&prev, region)) = self.regions.range(..end).next_back() {
            if prev + region.size > address {
                bail!(
                    "Region {:#x}+{} overlaps mapped region {:#x}+{}",
                    address,
                    size,
                    prev,
                    region.size
                );
            }
        }
        self.regions.insert(
            address,
            Region {
                size,
                bytes: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn unmap(&mut self, address: u64) -> Result<()> {
        match self.regions.remove(&address) {
            Some(_) => Ok(()),
            None => bail!("No region mapped at {:#x}", address),
        }
    }

    pub fn write(&mut self, address: u64, data: &[u8]) -> Result<()> {
        trace!("Device write {:#x} ({} bytes)", address, data.len());
        let (offset, region) = self.locate(address, data.len() as u64)?;
        region.backing()[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_into(&mut self, address: u64, out: &mut [u8]) -> Result<()> {
        trace!("Device read {:#x} ({} bytes)", address, out.len());
        let (offset, region) = self.locate(address, out.len() as u64)?;
        if region.bytes.is_empty() {
            out.fill(0);
        } else {
            out.copy_from_slice(&region.bytes[offset..offset + out.len()]);
        }
        Ok(())
    }

    pub fn read(&mut self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.read_into(address, &mut out)?;
        Ok(out)
    }

    /// Find the region containing `[address, address + len)`.
    fn locate(&mut self, address: u64, len: u64) -> Result<(usize, &mut Region)> {
        let Some((&start, region)) = self.regions.range_mut(..=address).next_back() else {
            bail!("Device address {:#x} is not mapped", address);
        };
        let offset = address - start;
        let in_bounds = offset
            .checked_add(len)
            .map(|end| end <= region.size)
            .unwrap_or(false);
        if !in_bounds {
            bail!(
                "Access {:#x}+{} outside region {:#x}+{}",
                address,
                len,
                start,
                region.size
            );
        }
        Ok((offset as usize, region))
    }
}
