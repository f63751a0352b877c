use ndarray::{Array2, array};
use vdr_bench::{Embedding, EmbeddingBatch, Error, scoring};

fn multi(items: Vec<Array2<f32>>) -> Embedding {
   Embedding::MultiVector(items)
}

#[test]
fn max_sim_sums_best_token_matches() {
   let query = array![[1.0, 0.0], [0.0, 1.0]];
   let passage = array![[0.5, 0.5], [1.0, 0.0], [0.0, 0.25]];
   // token 0 best = 1.0, token 1 best = 0.5
   assert_eq!(scoring::max_sim(&query.view(), &passage.view()), 1.5);
}

#[test]
fn multi_vector_scores_ignore_chunking() {
   let q_items = vec![array![[1.0, 0.0]], array![[0.0, 1.0], [1.0, 0.0]], array![[0.5, 0.5]]];
   let p_items = vec![array![[1.0, 0.0], [0.0, 1.0]], array![[0.0, 2.0]]];

   let one_chunk = EmbeddingBatch::from(vec![multi(q_items.clone())]);
   let split = EmbeddingBatch::from(vec![multi(q_items[..2].to_vec()), multi(q_items[2..].to_vec())]);
   let passages = EmbeddingBatch::from(vec![multi(p_items[..1].to_vec()), multi(p_items[1..].to_vec())]);

   let a = scoring::score_batches(&one_chunk, &passages, 1).unwrap();
   let b = scoring::score_batches(&split, &passages, 2).unwrap();
   assert_eq!(a.dim(), (3, 2));
   assert_eq!(a, b);
   assert_eq!(a[[1, 0]], 2.0);
   assert_eq!(a[[1, 1]], 2.0);
}

#[test]
fn single_vector_scores_are_dot_products() {
   let q = EmbeddingBatch::from(vec![Embedding::Dense(array![[1.0, 2.0]]), Embedding::Dense(array![[0.0, 1.0]])]);
   let p = EmbeddingBatch::from(vec![Embedding::Dense(array![[3.0, 4.0], [1.0, 1.0]])]);

   let scores = scoring::score_batches(&q, &p, 8).unwrap();
   assert_eq!(scores, array![[11.0, 3.0], [4.0, 1.0]]);
}

#[test]
fn mismatched_widths_are_invalid() {
   let q = EmbeddingBatch::from(vec![Embedding::Dense(array![[1.0, 2.0]])]);
   let p = EmbeddingBatch::from(vec![Embedding::Dense(array![[1.0, 2.0, 3.0]])]);
   assert!(matches!(scoring::score_batches(&q, &p, 1), Err(Error::InvalidArgument(_))));
}

#[test]
fn empty_inputs_and_zero_batch_are_invalid() {
   let q = EmbeddingBatch::from(vec![multi(vec![array![[1.0]]])]);
   assert!(matches!(
      scoring::score_batches(&q, &EmbeddingBatch::new(), 1),
      Err(Error::InvalidArgument(_))
   ));
   assert!(matches!(scoring::score_batches(&q, &q, 0), Err(Error::InvalidArgument(_))));
}

#[test]
fn non_finite_scores_are_rejected() {
   let scores = array![[0.5, f32::NAN]];
   let err = scoring::ensure_finite(&scores).unwrap_err();
   assert!(err.to_string().contains("(0, 1)"));
}
