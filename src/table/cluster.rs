use anyhow::{Context, Result, anyhow, bail};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::handlers::partition_router;
use super::layout::TableLayout;
use super::map::KmerHashMap;
use super::protocol::{ENDPOINT_HANDLE, PartitionHandle};
use super::slots::PartitionSlots;
use super::transport::{HttpTransport, PeerPartition};
use crate::kmer::codec::{KmerKey, KmerRecord};

const JOIN_ATTEMPTS: usize = 40;
const JOIN_RETRY_DELAY: Duration = Duration::from_millis(250);
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// A rank that has allocated and published its partition but has not yet
/// completed the handle exchange. Half of the construction collective:
/// `bind` on every rank, then `join` on every rank.
pub struct BoundTable {
    layout: TableLayout,
    slots: Arc<PartitionSlots>,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl BoundTable {
    /// Allocates this rank's partition and starts serving it.
    ///
    /// Every rank must call this with the same `capacity` and `nprocs`;
    /// `rank` doubles as the partition index. Bind to port 0 to let the OS
    /// pick, then distribute `local_addr()` out of band.
    pub async fn bind(
        capacity: u64,
        rank: u32,
        nprocs: u32,
        bind_addr: SocketAddr,
    ) -> Result<Self> {
        let layout = TableLayout::new(capacity, nprocs)?;
        if rank >= nprocs {
            bail!("rank {} out of range for {} processes", rank, nprocs);
        }

        let slots = Arc::new(PartitionSlots::new(rank, layout.partition_len(rank)));

        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind partition server on {}", bind_addr))?;
        let local_addr = listener.local_addr()?;

        let app = partition_router(slots.clone(), layout);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            });
            if let Err(e) = serve.await {
                tracing::error!("Partition server failed: {}", e);
            }
        });

        tracing::info!(
            "Rank {} published partition ({} slots) on {}",
            rank,
            slots.len(),
            local_addr
        );

        Ok(Self {
            layout,
            slots,
            local_addr,
            server,
            shutdown_tx,
        })
    }

    /// The address the partition server actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Completes the construction collective: fetches every peer's partition
    /// handle, verifying that all ranks agree on the table geometry.
    ///
    /// `peers[r]` must be rank r's published address (including this rank's
    /// own). The call returns only once every handle is known, so a rank
    /// that got past `join` cannot observe an unpublished partition; since
    /// every rank joins, this is the startup barrier. Geometry disagreement
    /// or an unreachable peer is fatal and leaves no usable table.
    pub async fn join(self, peers: Vec<SocketAddr>) -> Result<ClusterTable> {
        if peers.len() != self.layout.partitions() as usize {
            bail!(
                "peer list has {} entries, expected {}",
                peers.len(),
                self.layout.partitions()
            );
        }

        let http_client = reqwest::Client::new();
        let mut exchanged = Vec::with_capacity(peers.len());

        for (rank, addr) in peers.iter().enumerate() {
            let handle = fetch_handle(&http_client, *addr)
                .await
                .with_context(|| format!("handle exchange with rank {} at {}", rank, addr))?;

            if handle.rank != rank as u32 {
                bail!(
                    "peer at {} reports rank {}, expected {}",
                    addr,
                    handle.rank,
                    rank
                );
            }
            if handle.capacity != self.layout.capacity()
                || handle.partitions != self.layout.partitions()
            {
                bail!(
                    "construction mismatch: rank {} built capacity {} / {} partitions, \
                     local table is capacity {} / {} partitions",
                    rank,
                    handle.capacity,
                    handle.partitions,
                    self.layout.capacity(),
                    self.layout.partitions()
                );
            }
            if handle.len != self.layout.partition_len(rank as u32) {
                bail!(
                    "construction mismatch: rank {} holds {} slots, layout expects {}",
                    rank,
                    handle.len,
                    self.layout.partition_len(rank as u32)
                );
            }

            tracing::debug!("Exchanged handle with rank {} at {}", rank, addr);
            exchanged.push(PeerPartition {
                handle,
                addr: *addr,
            });
        }

        tracing::info!(
            "Rank {} joined table: capacity {}, {} partitions",
            self.slots.rank(),
            self.layout.capacity(),
            self.layout.partitions()
        );

        let transport = HttpTransport::new(self.slots, exchanged);
        Ok(ClusterTable {
            map: KmerHashMap::new(self.layout, transport),
            server: self.server,
            shutdown_tx: self.shutdown_tx,
        })
    }
}

async fn fetch_handle(
    http_client: &reqwest::Client,
    addr: SocketAddr,
) -> Result<PartitionHandle> {
    let url = format!("http://{}{}", addr, ENDPOINT_HANDLE);
    let mut last_err = None;

    // Peers may still be binding; keep knocking until the budget runs out.
    for _ in 0..JOIN_ATTEMPTS {
        match http_client
            .get(url.clone())
            .timeout(JOIN_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                return Ok(response.json().await?);
            }
            Ok(response) => {
                last_err = Some(anyhow!("handle request failed: {}", response.status()));
            }
            Err(e) => {
                last_err = Some(anyhow!(e));
            }
        }

        let jitter = rand::random::<u64>() % 50;
        tokio::time::sleep(JOIN_RETRY_DELAY + Duration::from_millis(jitter)).await;
    }

    Err(last_err.unwrap_or_else(|| anyhow!("handle exchange retry budget exhausted")))
}

/// One rank's view of the fully constructed distributed table.
pub struct ClusterTable {
    map: KmerHashMap<HttpTransport>,
    server: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl ClusterTable {
    pub fn layout(&self) -> &TableLayout {
        self.map.layout()
    }

    /// See [`KmerHashMap::insert`].
    pub async fn insert(&self, record: KmerRecord) -> Result<bool> {
        self.map.insert(record).await
    }

    /// See [`KmerHashMap::find`].
    pub async fn find(&self, key: &KmerKey) -> Result<Option<KmerRecord>> {
        self.map.find(key).await
    }

    /// Stops serving this rank's partition and releases it.
    ///
    /// Collective: all ranks must have quiesced their insert/find traffic
    /// before any rank starts shutting down, or remote operations will fail.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        self.server
            .await
            .map_err(|e| anyhow!("partition server task panicked: {}", e))?;
        tracing::info!("Partition server stopped");
        Ok(())
    }
}
