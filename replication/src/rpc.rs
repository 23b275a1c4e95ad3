//! Remote procedure calls: typed one-off messages outside the snapshot
//! stream.
//!
//! Each RPC type is registered once and receives a dense id in
//! registration order, so both peers must register the same types in the
//! same order. Queued RPCs are batched into a single `Rpc` message.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use bitstream::{BitError, BitReader, BitResult, BitWriter, CompressionModel};
use wire::{decode_rpc_header, encode_rpc_header, EncodeError, Limits};

use crate::error::{RpcError, RpcResult};

/// Largest RPC message a queue will build.
pub const MAX_RPC_MESSAGE_BYTES: usize = 64 * 1024;

/// A message type that can be sent as an RPC.
pub trait RpcCommand: Sized + Send + 'static {
    /// Stable name, used in errors and logs.
    const NAME: &'static str;

    fn serialize(&self, writer: &mut BitWriter, model: &CompressionModel) -> BitResult<()>;

    fn deserialize(reader: &mut BitReader<'_>, model: &CompressionModel) -> BitResult<Self>;
}

type Invocation<C> = Box<dyn FnOnce(&mut C) -> RpcResult<()>>;
type Decoder<C> =
    Box<dyn Fn(&mut BitReader<'_>, &CompressionModel) -> RpcResult<Invocation<C>> + Send + Sync>;

struct RpcEntry<C> {
    name: &'static str,
    decode: Decoder<C>,
}

/// RPC types known to one peer, with the handler each one runs against a
/// context of type `C`.
pub struct RpcRegistry<C> {
    entries: Vec<RpcEntry<C>>,
    ids: HashMap<TypeId, u32>,
}

impl<C> std::fmt::Debug for RpcRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.name))
            .finish()
    }
}

impl<C: 'static> Default for RpcRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> RpcRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            ids: HashMap::new(),
        }
    }

    /// Registers `R` with the handler that runs when one arrives. Returns
    /// the id assigned to it.
    pub fn register<R, H>(&mut self, handler: H) -> RpcResult<u32>
    where
        R: RpcCommand,
        H: Fn(R, &mut C) -> RpcResult<()> + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<R>();
        if self.ids.contains_key(&type_id) || self.entries.iter().any(|e| e.name == R::NAME) {
            return Err(RpcError::DuplicateRpc { name: R::NAME });
        }
        let id = u32::try_from(self.entries.len()).map_err(|_| RpcError::TooManyRpcs)?;
        let handler = Arc::new(handler);
        let decode: Decoder<C> = Box::new(
            move |reader: &mut BitReader<'_>, model: &CompressionModel| -> RpcResult<Invocation<C>> {
                let rpc = R::deserialize(reader, model)?;
                let handler = Arc::clone(&handler);
                Ok(Box::new(move |ctx: &mut C| (*handler)(rpc, ctx)))
            },
        );
        self.entries.push(RpcEntry {
            name: R::NAME,
            decode,
        });
        self.ids.insert(type_id, id);
        Ok(id)
    }

    /// Id assigned to `R`.
    pub fn id_of<R: RpcCommand>(&self) -> RpcResult<u32> {
        self.ids
            .get(&TypeId::of::<R>())
            .copied()
            .ok_or(RpcError::Unregistered { name: R::NAME })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes an RPC message and runs each handler in order.
    ///
    /// The whole message is decoded before any handler runs, so a
    /// malformed message runs nothing. A handler error stops the RPCs
    /// after it. Returns the number of RPCs run.
    pub fn dispatch(
        &self,
        bytes: &[u8],
        model: &CompressionModel,
        limits: &Limits,
        ctx: &mut C,
    ) -> RpcResult<usize> {
        let (count, mut reader) = decode_rpc_header(bytes, model, limits)?;
        let mut invocations = Vec::with_capacity(count);
        for _ in 0..count {
            let id = reader.read_packed_uint(model)?;
            let entry = usize::try_from(id)
                .ok()
                .and_then(|index| self.entries.get(index))
                .ok_or(RpcError::UnknownRpc { id })?;
            invocations.push((entry.name, (entry.decode)(&mut reader, model)?));
        }
        for (name, invocation) in invocations {
            log::trace!("running rpc {name}");
            invocation(ctx)?;
        }
        Ok(count)
    }
}

trait ErasedRpc: Send {
    fn write(&self, writer: &mut BitWriter, model: &CompressionModel) -> BitResult<()>;
}

impl<R: RpcCommand> ErasedRpc for R {
    fn write(&self, writer: &mut BitWriter, model: &CompressionModel) -> BitResult<()> {
        self.serialize(writer, model)
    }
}

struct QueuedRpc {
    id: u32,
    name: &'static str,
    rpc: Box<dyn ErasedRpc>,
}

/// Outgoing RPCs waiting for the next flush.
#[derive(Default)]
pub struct RpcQueue {
    pending: Vec<QueuedRpc>,
}

impl std::fmt::Debug for RpcQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.pending.iter().map(|queued| queued.name))
            .finish()
    }
}

impl RpcQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `rpc`; it must be registered in `registry`.
    pub fn push<R: RpcCommand, C: 'static>(
        &mut self,
        registry: &RpcRegistry<C>,
        rpc: R,
    ) -> RpcResult<()> {
        let id = registry.id_of::<R>()?;
        self.pending.push(QueuedRpc {
            id,
            name: R::NAME,
            rpc: Box::new(rpc),
        });
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Encodes as many queued RPCs as fit into one message, oldest first.
    ///
    /// Returns `None` when nothing is queued. RPCs that did not fit stay
    /// queued for the next flush.
    pub fn flush(
        &mut self,
        model: &CompressionModel,
        limits: &Limits,
    ) -> RpcResult<Option<Vec<u8>>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let capacity = limits.max_packet_bytes.min(MAX_RPC_MESSAGE_BYTES);
        let mut count = self.pending.len().min(limits.max_rpcs);
        loop {
            match self.encode(count, capacity, model) {
                Ok(bytes) => {
                    self.pending.drain(..count);
                    log::trace!("flushed {count} rpcs in {} bytes", bytes.len());
                    return Ok(Some(bytes));
                }
                Err(EncodeError::Bitstream(BitError::BufferOverflow { .. })) if count > 1 => {
                    count /= 2;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn encode(
        &self,
        count: usize,
        capacity: usize,
        model: &CompressionModel,
    ) -> Result<Vec<u8>, EncodeError> {
        let mut writer = BitWriter::new(capacity);
        encode_rpc_header(&mut writer, count, model)?;
        for queued in self.pending.iter().take(count) {
            writer.write_packed_uint(queued.id, model)?;
            queued.rpc.write(&mut writer, model)?;
        }
        Ok(writer.finish())
    }
}

/// First message on a new connection: the server assigns the client's id
/// and both sides compare ghost collection hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub collection_hash: u64,
    pub network_id: u32,
}

impl Handshake {
    /// Fails when the peer's collection differs from ours.
    pub fn verify(&self, expected_hash: u64) -> RpcResult<()> {
        if self.collection_hash != expected_hash {
            return Err(RpcError::Rejected {
                name: Self::NAME,
                reason: format!(
                    "collection hash {:016x} does not match {:016x}",
                    self.collection_hash, expected_hash
                ),
            });
        }
        Ok(())
    }
}

impl RpcCommand for Handshake {
    const NAME: &'static str = "Handshake";

    fn serialize(&self, writer: &mut BitWriter, model: &CompressionModel) -> BitResult<()> {
        writer.write_raw_bits(self.collection_hash as u32, 32)?;
        writer.write_raw_bits((self.collection_hash >> 32) as u32, 32)?;
        writer.write_packed_uint(self.network_id, model)
    }

    fn deserialize(reader: &mut BitReader<'_>, model: &CompressionModel) -> BitResult<Self> {
        let low = u64::from(reader.read_raw_bits(32)?);
        let high = u64::from(reader.read_raw_bits(32)?);
        Ok(Self {
            collection_hash: (high << 32) | low,
            network_id: reader.read_packed_uint(model)?,
        })
    }
}
