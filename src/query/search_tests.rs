//! End-to-end retrieval tests over real indexes

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use crate::index::{GlobalParameters, IndexBuilder, InvertedIndex};
use crate::query::{
    QueryContainer, RankedAndQuery, RankedOrQuery, Ranker, RequestFlags, ScoredDoc,
    scored_cursors,
};
use crate::structures::BlockCodec;
use crate::wand::WandData;
use crate::{DocId, Score};

fn two_term_index() -> InvertedIndex {
    let mut builder = IndexBuilder::new(10, GlobalParameters::default());
    builder.add_posting_list(&[1, 3, 5], &[1, 1, 1]).unwrap();
    builder.add_posting_list(&[2, 3, 4], &[1, 1, 1]).unwrap();
    builder.build().unwrap()
}

fn run_or(index: &InvertedIndex, term_ids: Vec<u32>, k: usize) -> Vec<ScoredDoc> {
    let request = QueryContainer::from_term_ids(term_ids)
        .query(k, RequestFlags::all())
        .unwrap();
    let mut cursors = scored_cursors(index, None, &Ranker::quantized(), &request).unwrap();
    let mut driver = RankedOrQuery::new(k);
    driver.run(&mut cursors, index.num_docs());
    driver.topk().to_vec()
}

fn run_and(index: &InvertedIndex, term_ids: Vec<u32>, k: usize) -> Vec<ScoredDoc> {
    let request = QueryContainer::from_term_ids(term_ids)
        .query(k, RequestFlags::all())
        .unwrap();
    let mut cursors = scored_cursors(index, None, &Ranker::quantized(), &request).unwrap();
    let mut driver = RankedAndQuery::new(k);
    driver.run(&mut cursors, index.num_docs());
    driver.topk().to_vec()
}

#[test]
fn test_identity_ranker_disjunction() {
    let index = two_term_index();
    let topk = run_or(&index, vec![0, 1], 3);
    let results: Vec<(DocId, Score)> = topk.iter().map(|e| (e.docid, e.score)).collect();
    assert_eq!(results, vec![(3, 2.0), (1, 1.0), (2, 1.0)]);
}

#[test]
fn test_identity_ranker_conjunction() {
    let index = two_term_index();
    let topk = run_and(&index, vec![0, 1], 3);
    let results: Vec<(DocId, Score)> = topk.iter().map(|e| (e.docid, e.score)).collect();
    assert_eq!(results, vec![(3, 2.0)]);
}

/// Build a random index and return it along with the raw lists
fn random_index(
    rng: &mut StdRng,
    num_terms: usize,
    num_docs: DocId,
    codec: BlockCodec,
) -> (InvertedIndex, Vec<Vec<(DocId, u32)>>) {
    let params = GlobalParameters {
        block_size: 8,
        codec,
    };
    let mut builder = IndexBuilder::new(num_docs, params);
    let mut lists = Vec::new();
    for _ in 0..num_terms {
        let mut docids: Vec<DocId> = (0..num_docs)
            .filter(|_| rng.gen_bool(0.2))
            .collect();
        if docids.is_empty() {
            docids.push(rng.gen_range(0..num_docs));
        }
        let postings: Vec<(DocId, u32)> = docids
            .iter()
            .map(|&d| (d, rng.gen_range(1..16)))
            .collect();
        let freqs: Vec<u32> = postings.iter().map(|p| p.1).collect();
        builder.add_posting_list(&docids, &freqs).unwrap();
        lists.push(postings);
    }
    (builder.build().unwrap(), lists)
}

/// Exhaustive disjunctive top-k over the raw lists
fn brute_force_or(lists: &[Vec<(DocId, u32)>], num_docs: DocId, k: usize) -> Vec<(DocId, Score)> {
    let mut scores = vec![0.0f32; num_docs as usize];
    for list in lists {
        for &(doc, freq) in list {
            scores[doc as usize] += freq as f32;
        }
    }
    let mut entries: Vec<(DocId, Score)> = scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > 0.0)
        .map(|(doc, &score)| (doc as DocId, score))
        .collect();
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    entries.truncate(k);
    entries
}

#[test]
fn test_or_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(7);
    for codec in [BlockCodec::Raw, BlockCodec::VarByte, BlockCodec::Bitpacked] {
        let (index, lists) = random_index(&mut rng, 4, 300, codec);
        for k in [1, 5, 10, 50] {
            let expected = brute_force_or(&lists, index.num_docs(), k);
            let actual: Vec<(DocId, Score)> = run_or(&index, vec![0, 1, 2, 3], k)
                .iter()
                .map(|e| (e.docid, e.score))
                .collect();
            assert_eq!(actual, expected, "codec {codec:?}, k {k}");
        }
    }
}

#[test]
fn test_and_is_or_restricted_to_intersection() {
    let mut rng = StdRng::seed_from_u64(13);
    let (index, lists) = random_index(&mut rng, 3, 200, BlockCodec::Bitpacked);

    let in_all: Vec<DocId> = (0..index.num_docs())
        .filter(|d| lists.iter().all(|list| list.iter().any(|&(doc, _)| doc == *d)))
        .collect();

    let or_results = run_or(&index, vec![0, 1, 2], index.num_docs() as usize);
    let expected: Vec<(DocId, Score)> = or_results
        .iter()
        .filter(|e| in_all.contains(&e.docid))
        .map(|e| (e.docid, e.score))
        .take(10)
        .collect();

    let actual: Vec<(DocId, Score)> = run_and(&index, vec![0, 1, 2], 10)
        .iter()
        .map(|e| (e.docid, e.score))
        .collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_threshold_seeding_preserves_results() {
    let mut rng = StdRng::seed_from_u64(29);
    let (index, _) = random_index(&mut rng, 3, 250, BlockCodec::Bitpacked);
    let k = 10;

    let baseline = run_or(&index, vec![0, 1, 2], k);
    let min_score = baseline.last().unwrap().score;

    let request = QueryContainer::from_term_ids(vec![0, 1, 2])
        .query(k, RequestFlags::all())
        .unwrap();
    for seed in [0.0, min_score / 2.0, min_score] {
        let mut cursors = scored_cursors(&index, None, &Ranker::quantized(), &request).unwrap();
        let mut driver = RankedOrQuery::with_threshold(k, seed);
        driver.run(&mut cursors, index.num_docs());
        assert_eq!(driver.topk(), baseline, "seed threshold {seed}");
    }
}

#[test]
fn test_request_threshold_drives_driver_seed() {
    let index = two_term_index();
    let mut container = QueryContainer::from_term_ids(vec![0, 1]);
    container.add_threshold(3, 1.5);
    let request = container.query(3, RequestFlags::all()).unwrap();

    let mut cursors = scored_cursors(&index, None, &Ranker::quantized(), &request).unwrap();
    let mut driver = match request.threshold() {
        Some(threshold) => RankedOrQuery::with_threshold(request.k(), threshold),
        None => RankedOrQuery::new(request.k()),
    };
    driver.run(&mut cursors, index.num_docs());
    // Only doc 3 (score 2.0) clears the 1.5 hint
    let results: Vec<(DocId, Score)> = driver.topk().iter().map(|e| (e.docid, e.score)).collect();
    assert_eq!(results, vec![(3, 2.0)]);
}

#[test]
fn test_live_block_skipping_is_lossless() {
    let mut rng = StdRng::seed_from_u64(41);
    let (index, _) = random_index(&mut rng, 4, 400, BlockCodec::Bitpacked);
    let k = 5;
    let ranker = Ranker::quantized();
    let mut wand = WandData::build(&index, &ranker, true).unwrap();
    wand.quantize(&index, &ranker, 64).unwrap();

    let baseline = run_or(&index, vec![0, 1, 2, 3], k);
    let seed = baseline.last().unwrap().score;

    let request = QueryContainer::from_term_ids(vec![0, 1, 2, 3])
        .query(k, RequestFlags::all())
        .unwrap();
    let live = wand.live_blocks(request.term_ids(), seed).unwrap();

    let mut cursors = scored_cursors(&index, Some(&wand), &ranker, &request).unwrap();
    let mut driver = RankedOrQuery::with_threshold(k, seed);
    driver.run_live_blocks(
        &mut cursors,
        index.num_docs(),
        &live,
        wand.range_size().unwrap(),
    );
    assert_eq!(driver.topk(), baseline);
}

#[test]
fn test_weighted_duplicate_terms_scale_scores() {
    let index = two_term_index();
    // Term 0 appears twice: its contributions double
    let request = QueryContainer::from_term_ids(vec![0, 0, 1])
        .query(3, RequestFlags::all())
        .unwrap();
    let mut cursors = scored_cursors(&index, None, &Ranker::quantized(), &request).unwrap();
    let mut driver = RankedOrQuery::new(3);
    driver.run(&mut cursors, index.num_docs());
    let results: Vec<(DocId, Score)> = driver.topk().iter().map(|e| (e.docid, e.score)).collect();
    assert_eq!(results, vec![(3, 3.0), (1, 2.0), (5, 2.0)]);
}

#[test]
fn test_mmap_backed_search() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("index.bin");
    let mut builder = IndexBuilder::new(10, GlobalParameters::default());
    builder.add_posting_list(&[1, 3, 5], &[1, 1, 1]).unwrap();
    builder.add_posting_list(&[2, 3, 4], &[1, 1, 1]).unwrap();
    builder.write_to(&path).unwrap();

    let index = InvertedIndex::open(&path).unwrap();
    let results: Vec<(DocId, Score)> = run_or(&index, vec![0, 1], 3)
        .iter()
        .map(|e| (e.docid, e.score))
        .collect();
    assert_eq!(results, vec![(3, 2.0), (1, 1.0), (2, 1.0)]);
}

#[test]
fn test_bm25_end_to_end_ordering() {
    let mut builder = IndexBuilder::new(100, GlobalParameters::default());
    // Rare term in two docs, common term in many
    builder.add_posting_list(&[10, 40], &[3, 1]).unwrap();
    let common: Vec<DocId> = (0..80).collect();
    let freqs = vec![1u32; 80];
    builder.add_posting_list(&common, &freqs).unwrap();
    let index = builder.build().unwrap();

    let ranker = Ranker::bm25(crate::query::CollectionStats::new(100, 5.0));
    let request = QueryContainer::from_term_ids(vec![0, 1])
        .query(5, RequestFlags::all())
        .unwrap();
    let mut cursors = scored_cursors(&index, None, &ranker, &request).unwrap();
    let mut driver = RankedOrQuery::new(5);
    driver.run(&mut cursors, index.num_docs());

    let topk = driver.topk();
    // Docs matching the rare term outrank common-only docs
    assert_eq!(topk[0].docid, 10);
    assert_eq!(topk[1].docid, 40);
    assert!(topk[0].score > topk[2].score);
}
