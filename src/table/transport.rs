use anyhow::{Result, anyhow, bail};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::layout::SlotAddr;
use super::protocol::{
    ClaimRequest, ClaimResponse, ENDPOINT_CLAIM, ENDPOINT_PEEK, ENDPOINT_READ, ENDPOINT_WRITE,
    PartitionHandle, PeekResponse, ReadResponse, WriteRequest, WriteResponse,
};
use super::slots::PartitionSlots;
use crate::kmer::codec::KmerRecord;

const OP_TIMEOUT: Duration = Duration::from_millis(500);
const OP_ATTEMPTS: usize = 3;

/// One-sided access to any slot in the table.
///
/// `claim` and `peek` target a slot's occupancy counter, `read_record` and
/// `write_record` its payload cell. The counter ops are atomic at the owning
/// rank; they order nothing on the payload cell, so probing code must verify
/// the stored key itself.
pub trait SlotTransport: Send + Sync {
    /// Atomic fetch-add(1); a returned 0 means this caller won the slot.
    fn claim(&self, addr: SlotAddr) -> impl Future<Output = Result<u64>> + Send;

    /// Atomic load; 0 = free, >= 1 = claimed at least once.
    fn peek(&self, addr: SlotAddr) -> impl Future<Output = Result<u64>> + Send;

    fn read_record(
        &self,
        addr: SlotAddr,
    ) -> impl Future<Output = Result<Option<KmerRecord>>> + Send;

    fn write_record(
        &self,
        addr: SlotAddr,
        record: KmerRecord,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Transport for a table whose partitions all live in the calling process.
pub struct LoopbackTransport {
    partitions: Vec<Arc<PartitionSlots>>,
}

impl LoopbackTransport {
    pub fn new(partitions: Vec<Arc<PartitionSlots>>) -> Self {
        Self { partitions }
    }

    fn partition(&self, addr: SlotAddr) -> Result<&Arc<PartitionSlots>> {
        self.partitions
            .get(addr.partition as usize)
            .ok_or_else(|| anyhow!("partition {} out of range", addr.partition))
    }
}

impl SlotTransport for LoopbackTransport {
    async fn claim(&self, addr: SlotAddr) -> Result<u64> {
        self.partition(addr)?.claim(addr.offset)
    }

    async fn peek(&self, addr: SlotAddr) -> Result<u64> {
        self.partition(addr)?.peek(addr.offset)
    }

    async fn read_record(&self, addr: SlotAddr) -> Result<Option<KmerRecord>> {
        self.partition(addr)?.read(addr.offset)
    }

    async fn write_record(&self, addr: SlotAddr, record: KmerRecord) -> Result<()> {
        self.partition(addr)?.write(addr.offset, record)
    }
}

/// A peer's partition as reachable over the network.
#[derive(Debug, Clone)]
pub struct PeerPartition {
    pub handle: PartitionHandle,
    pub addr: SocketAddr,
}

/// Transport for a table spread across ranks, one partition per rank.
///
/// Operations against this rank's own partition short-circuit to process
/// memory; everything else is an HTTP round trip to the owning rank.
/// Requests retry with backoff before the transport gives up; exhausting the
/// retry budget is fatal to the operation in flight.
pub struct HttpTransport {
    local: Arc<PartitionSlots>,
    peers: Vec<PeerPartition>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(local: Arc<PartitionSlots>, peers: Vec<PeerPartition>) -> Self {
        Self {
            local,
            peers,
            http_client: reqwest::Client::new(),
        }
    }

    fn peer(&self, partition: u32) -> Result<&PeerPartition> {
        self.peers
            .get(partition as usize)
            .ok_or_else(|| anyhow!("no handle for partition {}", partition))
    }

    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: String,
        payload: &T,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..OP_ATTEMPTS {
            let response = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(OP_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == OP_ATTEMPTS {
                        return Err(anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }

    async fn get_with_retry(&self, url: String) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..OP_ATTEMPTS {
            let response = self
                .http_client
                .get(url.clone())
                .timeout(OP_TIMEOUT)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == OP_ATTEMPTS {
                        return Err(anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow!("Retry attempts exhausted"))
    }
}

impl SlotTransport for HttpTransport {
    async fn claim(&self, addr: SlotAddr) -> Result<u64> {
        if addr.partition == self.local.rank() {
            return self.local.claim(addr.offset);
        }

        let peer = self.peer(addr.partition)?;
        let url = format!("http://{}{}", peer.addr, ENDPOINT_CLAIM);
        // One op id across all retries of this claim, so a re-sent request
        // whose original landed returns the cached pre-increment value
        // instead of burning the slot with a second fetch-add.
        let payload = ClaimRequest {
            op_id: Uuid::new_v4().to_string(),
            offset: addr.offset,
        };

        let response = self.post_with_retry(url, &payload).await?;
        if !response.status().is_success() {
            bail!(
                "claim on partition {} offset {} failed: {}",
                addr.partition,
                addr.offset,
                response.status()
            );
        }

        let claim: ClaimResponse = response.json().await?;
        Ok(claim.previous)
    }

    async fn peek(&self, addr: SlotAddr) -> Result<u64> {
        if addr.partition == self.local.rank() {
            return self.local.peek(addr.offset);
        }

        let peer = self.peer(addr.partition)?;
        let url = format!("http://{}{}/{}", peer.addr, ENDPOINT_PEEK, addr.offset);

        let response = self.get_with_retry(url).await?;
        if !response.status().is_success() {
            bail!(
                "peek on partition {} offset {} failed: {}",
                addr.partition,
                addr.offset,
                response.status()
            );
        }

        let peek: PeekResponse = response.json().await?;
        Ok(peek.count)
    }

    async fn read_record(&self, addr: SlotAddr) -> Result<Option<KmerRecord>> {
        if addr.partition == self.local.rank() {
            return self.local.read(addr.offset);
        }

        let peer = self.peer(addr.partition)?;
        let url = format!("http://{}{}/{}", peer.addr, ENDPOINT_READ, addr.offset);

        let response = self.get_with_retry(url).await?;
        if !response.status().is_success() {
            bail!(
                "record read on partition {} offset {} failed: {}",
                addr.partition,
                addr.offset,
                response.status()
            );
        }

        let read: ReadResponse = response.json().await?;
        Ok(read.record)
    }

    async fn write_record(&self, addr: SlotAddr, record: KmerRecord) -> Result<()> {
        if addr.partition == self.local.rank() {
            return self.local.write(addr.offset, record);
        }

        let peer = self.peer(addr.partition)?;
        let url = format!("http://{}{}", peer.addr, ENDPOINT_WRITE);
        let payload = WriteRequest {
            offset: addr.offset,
            record,
        };

        let response = self.post_with_retry(url, &payload).await?;
        if !response.status().is_success() {
            bail!(
                "record write on partition {} offset {} failed: {}",
                addr.partition,
                addr.offset,
                response.status()
            );
        }

        let write: WriteResponse = response.json().await?;
        if !write.success {
            bail!(
                "record write on partition {} offset {} rejected by owner",
                addr.partition,
                addr.offset
            );
        }
        Ok(())
    }
}
