/*!
 * Data Structures
 *
 * Small-string storage for module and function names. Most API names fit the
 * inline capacity, so interception records rarely touch the heap.
 */

mod inline_string;

pub use inline_string::InlineString;
