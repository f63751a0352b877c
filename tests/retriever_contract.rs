mod support;

use support::{TestRetriever, queries, text_passages};
use vdr_bench::{
   EncodeOptions, Error, Retriever, batching, scoring,
   retriever::DummyRetriever,
};

#[test]
fn five_queries_batch_two_split_two_two_one() {
   let retriever = TestRetriever;
   let q = queries(&["a", "bb", "ccc", "dddd", "eeeee"]);
   let batch = retriever
      .encode_queries(&q, 2, &EncodeOptions::default())
      .unwrap();

   assert_eq!(batch.chunk_sizes(), vec![2, 2, 1]);
   assert_eq!(batch.total_items(), 5);

   let flat = scoring::flatten_dense(&batch, "query").unwrap();
   let lengths: Vec<f32> = flat.column(0).to_vec();
   assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
}

#[test]
fn batch_count_is_ceiling_for_every_batch_size() {
   let retriever = TestRetriever;
   let q = queries(&["a", "b", "c", "d", "e", "f", "g"]);
   for batch_size in 1..=9 {
      let batch = retriever
         .encode_queries(&q, batch_size, &EncodeOptions::default())
         .unwrap();
      assert_eq!(batch.len(), q.len().div_ceil(batch_size), "batch_size={batch_size}");
      assert_eq!(batch.len(), batching::batch_count(q.len(), batch_size));
   }
}

#[test]
fn empty_input_yields_empty_batch() {
   let opts = EncodeOptions::default();
   assert!(TestRetriever.encode_queries(&[], 4, &opts).unwrap().is_empty());
   assert!(TestRetriever.encode_passages(&[], 4, &opts).unwrap().is_empty());
   assert!(DummyRetriever::default().encode_queries(&[], 4, &opts).unwrap().is_empty());
}

#[test]
fn zero_batch_size_is_invalid() {
   let opts = EncodeOptions::default();
   assert!(matches!(
      TestRetriever.encode_queries(&queries(&["a"]), 0, &opts),
      Err(Error::InvalidArgument(_))
   ));
   assert!(matches!(
      DummyRetriever::default().encode_queries(&queries(&["a"]), 0, &opts),
      Err(Error::InvalidArgument(_))
   ));
}

#[test]
fn score_shape_is_queries_by_passages() {
   let retriever = TestRetriever;
   let opts = EncodeOptions::default();
   let q = retriever
      .encode_queries(&queries(&["a", "bb", "ccc"]), 2, &opts)
      .unwrap();
   let p = retriever
      .encode_passages(&text_passages(&["x", "yy", "zzz", "wwww", "v"]), 3, &opts)
      .unwrap();

   let scores = retriever.score(&q, &p, Some(2)).unwrap();
   assert_eq!(scores.dim(), (3, 5));
   // [len, 1] . [len, 1] = q_len * p_len + 1
   assert_eq!(scores[[2, 3]], 13.0);
   scoring::ensure_finite(&scores).unwrap();
}

#[test]
fn mismatched_passages_are_rejected_at_first_offender() {
   let mut passages = text_passages(&["a", "b"]);
   passages.push(vdr_bench::Passage::Image(image::DynamicImage::new_rgb8(2, 2)));

   match TestRetriever.encode_passages(&passages, 2, &EncodeOptions::default()) {
      Err(Error::TypeMismatch { index, expected, found }) => {
         assert_eq!(index, 2);
         assert_eq!(expected, vdr_bench::CapabilityMode::Textual);
         assert_eq!(found, vdr_bench::CapabilityMode::Visual);
      },
      other => panic!("expected type mismatch, got {other:?}"),
   }
}
