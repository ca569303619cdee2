// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use btp_relayer_chain_traits::{
    DstBlockHandler, OnConnect, Receiver, Sender, SrcBlockHandler,
};
use btp_relayer_store::SledStore;
use btp_relayer_types::wire::{self, ReceiptProofWire, RelayMessageWire};
use btp_relayer_types::{
    BlockUpdate, BmcLinkStatus, BtpAddress, Event, ReceiptProof, RevertCode,
    Segment, TransactionResult, TxHash,
};
use btp_relayer_utils::{Error, Result};

use crate::RelayLink;

const TX_SIZE_LIMIT: usize = 1024;

fn src_addr() -> BtpAddress {
    "btp://0x2.bsc/0x1234567890abcdef"
        .parse()
        .unwrap()
}

fn dst_addr() -> BtpAddress {
    "btp://0x1.icon/cx9c72bb4e07dccbf20ec83e82e0aca0ab30cdcbad"
        .parse()
        .unwrap()
}

fn block_update(height: i64) -> BlockUpdate {
    BlockUpdate {
        height,
        block_hash: vec![height as u8; 32],
        header: vec![height as u8; 8],
        proof: vec![height as u8; 16],
    }
}

fn receipt_proof(sequences: std::ops::RangeInclusive<u64>) -> ReceiptProof {
    ReceiptProof {
        index: 0,
        proof: vec![0xaa; 8],
        events: sequences
            .clone()
            .map(|sequence| Event {
                sequence,
                next: String::new(),
                message: vec![0xee],
            })
            .collect(),
        event_proofs: sequences.map(|s| vec![s as u8; 4]).collect(),
    }
}

struct StubSender {
    status: Mutex<BmcLinkStatus>,
    relayed: Mutex<Vec<Vec<u8>>>,
    result_errors: Mutex<VecDeque<Error>>,
    result_calls: AtomicUsize,
    next_hash: AtomicU64,
    monitor_feed: Mutex<Option<mpsc::Receiver<i64>>>,
}

impl StubSender {
    fn new(status: BmcLinkStatus) -> (Arc<Self>, mpsc::Sender<i64>) {
        let (tx, rx) = mpsc::channel(16);
        let sender = Arc::new(Self {
            status: Mutex::new(status),
            relayed: Mutex::new(Vec::new()),
            result_errors: Mutex::new(VecDeque::new()),
            result_calls: AtomicUsize::new(0),
            next_hash: AtomicU64::new(0),
            monitor_feed: Mutex::new(Some(rx)),
        });
        (sender, tx)
    }

    fn set_status(&self, verifier_height: i64, rx_seq: u64, current: i64) {
        let mut status = self.status.lock();
        status.verifier.height = verifier_height;
        status.rx_seq = rx_seq;
        status.current_height = current;
    }

    fn queue_result_error(&self, err: Error) {
        self.result_errors.lock().push_back(err);
    }

    fn relayed(&self) -> Vec<Vec<u8>> {
        self.relayed.lock().clone()
    }
}

#[async_trait::async_trait]
impl Sender for StubSender {
    async fn relay(&self, segment: &Segment) -> Result<TxHash> {
        self.relayed.lock().push(segment.transaction_param());
        let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
        Ok(TxHash(format!("0x{n:04x}")))
    }

    async fn get_result(&self, param: &TxHash) -> Result<TransactionResult> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.result_errors.lock().pop_front() {
            return Err(err);
        }
        Ok(TransactionResult {
            tx_hash: param.clone(),
            block_height: self.status.lock().current_height,
        })
    }

    async fn get_status(&self) -> Result<BmcLinkStatus> {
        Ok(self.status.lock().clone())
    }

    async fn monitor_loop(
        &self,
        _height: i64,
        handler: Arc<dyn DstBlockHandler>,
        on_connect: OnConnect,
    ) -> Result<()> {
        on_connect();
        let mut feed = self
            .monitor_feed
            .lock()
            .take()
            .expect("monitor loop started twice");
        while let Some(height) = feed.recv().await {
            handler.on_block_of_dst(height).await?;
        }
        futures::future::pending::<()>().await;
        Ok(())
    }

    fn tx_size_limit(&self) -> usize {
        TX_SIZE_LIMIT
    }
}

struct StubReceiver {
    feed: Mutex<Option<mpsc::Receiver<(BlockUpdate, Vec<ReceiptProof>)>>>,
}

impl StubReceiver {
    fn new() -> (Arc<Self>, mpsc::Sender<(BlockUpdate, Vec<ReceiptProof>)>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Arc::new(Self {
                feed: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

#[async_trait::async_trait]
impl Receiver for StubReceiver {
    async fn receive_loop(
        &self,
        _height: i64,
        _seq: u64,
        handler: Arc<dyn SrcBlockHandler>,
        on_connect: OnConnect,
    ) -> Result<()> {
        on_connect();
        let mut feed =
            self.feed.lock().take().expect("receive loop started twice");
        while let Some((bu, rps)) = feed.recv().await {
            handler.on_block_of_src(bu, rps).await?;
        }
        futures::future::pending::<()>().await;
        Ok(())
    }
}

fn initial_status() -> BmcLinkStatus {
    let mut status = BmcLinkStatus::default();
    status.verifier.height = 0;
    status.verifier.offset = 0;
    status.verifier.last_height = 100;
    status.rx_seq = 0;
    status.current_height = 100;
    status
}

async fn wait_until<F>(mut condition: F, what: &str)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}",
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn wait_for_drain(link: &Arc<RelayLink<StubSender>>) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !link.queue_is_drained().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for the queue to drain",
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Harness {
    link: Arc<RelayLink<StubSender>>,
    sender: Arc<StubSender>,
    blocks: mpsc::Sender<(BlockUpdate, Vec<ReceiptProof>)>,
    dst_blocks: mpsc::Sender<i64>,
    serve: tokio::task::JoinHandle<Result<()>>,
}

fn start_link(store: &SledStore) -> Harness {
    let (sender, dst_blocks) = StubSender::new(initial_status());
    let (receiver, blocks) = StubReceiver::new();
    let link =
        RelayLink::new(src_addr(), dst_addr(), Arc::clone(&sender), store, 0)
            .unwrap();
    let serve = tokio::spawn(Arc::clone(&link).serve(receiver));
    Harness {
        link,
        sender,
        blocks,
        dst_blocks,
        serve,
    }
}

fn relayed_block_heights(params: &[Vec<u8>]) -> Vec<i64> {
    let mut heights = Vec::new();
    for param in params {
        let msg: RelayMessageWire = wire::decode(param).unwrap();
        for bu in &msg.block_updates {
            // test proofs are height-stamped byte runs
            heights.push(bu[0] as i64);
        }
    }
    heights
}

#[tokio::test]
#[tracing_test::traced_test]
async fn happy_path_relays_every_block_and_drains_the_queue() {
    let store = SledStore::temporary().unwrap();
    let h = start_link(&store);

    for height in 1..=10i64 {
        h.blocks
            .send((block_update(height), vec![]))
            .await
            .unwrap();
        let sender = Arc::clone(&h.sender);
        wait_until(
            || relayed_block_heights(&sender.relayed()).contains(&height),
            "block update to be relayed",
        )
        .await;

        h.sender.set_status(height, 0, 100 + height);
        h.dst_blocks.send(100 + height).await.unwrap();
        wait_for_drain(&h.link).await;
    }

    let params = h.sender.relayed();
    assert_eq!(relayed_block_heights(&params), (1..=10).collect::<Vec<_>>());
    for param in &params {
        assert!(param.len() <= TX_SIZE_LIMIT);
    }
    assert_eq!(h.link.accumulator_height(), 10);
    assert_eq!(h.link.queued_messages().await, 1);

    // the accumulator state survived through the store
    drop(h);
    let acc = btp_relayer_mta::ExtAccumulator::open(&store, 0).unwrap();
    assert_eq!(acc.height(), 10);
}

#[tokio::test]
#[tracing_test::traced_test]
async fn receipt_events_are_promoted_and_redelivered_with_a_block_proof() {
    let store = SledStore::temporary().unwrap();
    let h = start_link(&store);

    h.blocks
        .send((block_update(1), vec![receipt_proof(5..=9)]))
        .await
        .unwrap();
    let sender = Arc::clone(&h.sender);
    wait_until(|| !sender.relayed().is_empty(), "initial submission").await;
    wait_until(
        || sender.result_calls.load(Ordering::SeqCst) >= 1,
        "initial settlement",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // destination consumed events 5 and 6 and covered the block update
    h.sender.set_status(1, 6, 101);
    h.dst_blocks.send(101).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // destination consumed event 7; the promoted entry is re-segmented
    // with a fresh block proof and the two remaining events
    h.sender.set_status(1, 7, 102);
    h.dst_blocks.send(102).await.unwrap();
    wait_until(|| sender.relayed().len() >= 2, "re-dispatch after promotion")
        .await;

    let params = h.sender.relayed();
    let msg: RelayMessageWire = wire::decode(params.last().unwrap()).unwrap();
    assert!(msg.block_updates.is_empty());
    assert!(!msg.block_proof.is_empty());
    assert_eq!(msg.receipt_proofs.len(), 1);
    let rp: ReceiptProofWire = wire::decode(&msg.receipt_proofs[0]).unwrap();
    assert_eq!(
        rp.event_proofs
            .iter()
            .map(|e| e.to_vec())
            .collect::<Vec<_>>(),
        vec![vec![8u8; 4], vec![9u8; 4]],
    );

    // everything delivered, the entry disappears
    h.sender.set_status(1, 9, 103);
    h.dst_blocks.send(103).await.unwrap();
    wait_for_drain(&h.link).await;
}

#[tokio::test]
async fn a_source_height_gap_is_fatal() {
    let store = SledStore::temporary().unwrap();
    let h = start_link(&store);

    h.blocks.send((block_update(1), vec![])).await.unwrap();
    h.blocks.send((block_update(2), vec![])).await.unwrap();
    h.blocks.send((block_update(4), vec![])).await.unwrap();

    let outcome = h.serve.await.unwrap();
    assert!(matches!(
        outcome,
        Err(Error::MissingBlock {
            expected: 3,
            got: 4
        })
    ));
}

#[tokio::test]
async fn not_verifiable_results_reissue_the_same_segment() {
    let store = SledStore::temporary().unwrap();
    let h = start_link(&store);
    h.sender
        .queue_result_error(Error::Revert(RevertCode::BmvNotVerifiable));

    h.blocks.send((block_update(1), vec![])).await.unwrap();
    let sender = Arc::clone(&h.sender);
    wait_until(|| sender.relayed().len() == 1, "first submission").await;
    wait_until(
        || sender.result_calls.load(Ordering::SeqCst) >= 1,
        "first settlement attempt",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // any destination state movement triggers the next dispatch pass
    h.sender.set_status(0, 1, 101);
    h.dst_blocks.send(101).await.unwrap();
    wait_until(|| sender.relayed().len() >= 2, "re-submission").await;

    let params = h.sender.relayed();
    assert_eq!(params[0], params[1]);
}

#[tokio::test]
async fn transport_errors_leave_the_segment_awaiting() {
    let store = SledStore::temporary().unwrap();
    let h = start_link(&store);
    h.sender.queue_result_error(Error::Generic("connection reset"));

    h.blocks.send((block_update(1), vec![])).await.unwrap();
    let sender = Arc::clone(&h.sender);
    wait_until(|| sender.relayed().len() == 1, "first submission").await;
    wait_until(
        || sender.result_calls.load(Ordering::SeqCst) >= 1,
        "first settlement attempt",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the segment stays awaiting, so a status movement must not resubmit
    h.sender.set_status(0, 1, 101);
    h.dst_blocks.send(101).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.sender.relayed().len(), 1);

    // and a later entry must not overtake the blocked one
    h.blocks.send((block_update(2), vec![])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.sender.relayed().len(), 1);
    assert_eq!(h.link.queued_messages().await, 2);
}

#[tokio::test]
async fn unknown_revert_codes_tear_the_link_down() {
    let store = SledStore::temporary().unwrap();
    let h = start_link(&store);
    h.sender
        .queue_result_error(Error::Revert(RevertCode::Other(42)));

    h.blocks.send((block_update(1), vec![])).await.unwrap();
    let outcome = h.serve.await.unwrap();
    assert!(matches!(
        outcome,
        Err(Error::Revert(RevertCode::Other(42)))
    ));
}
