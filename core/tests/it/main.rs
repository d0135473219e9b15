/*! Integration tests for tree-fugue-core.
 *
 * Organized as a single integration test binary:
 * - helpers: a small in-memory network of replicas with causal delivery
 * - causal: per-sender queues delivered in differing causal orders
 * - convergence: replicas reach the same text after exchanging operations
 * - interleaving: concurrent runs of text never interleave
 * - persistence: save/load across replicas
 * - properties: proptest checks over random editing sessions
 */

#![cfg(feature = "text")]

mod convergence;
mod helpers;
mod properties;
