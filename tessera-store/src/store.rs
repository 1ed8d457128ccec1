use crate::document::{Document, DocumentRef};
use crate::error::StoreResult;
use crate::options::{DeleteOptions, FindOptions, LoadOptions, Query, SaveOptions};

/// Contract of a document storage backend.
///
/// Documents are addressed by `(_type, _id)`. Every batch operation either
/// succeeds as a whole or fails without side effects, and results come back
/// in request order.
pub trait DocumentStore: Send + Sync {
    /// Loads documents. A missing document is an error, or an acknowledgment
    /// carrying `_missed: true` when tolerated.
    fn load(&self, refs: &[DocumentRef], options: &LoadOptions) -> StoreResult<Vec<Document>>;

    /// Upserts documents and returns their acknowledgments: the saved
    /// document without `_new`, plus `_missed` or `_existed` when a tolerated
    /// mismatch between `_new` and the stored state occurred.
    ///
    /// Embedded objects are merged into the stored ones, `null` deletes a
    /// field, and arrays of sub-documents are merged element-wise by
    /// `(_type, _id)`.
    fn save(&self, documents: &[Document], options: &SaveOptions) -> StoreResult<Vec<Document>>;

    /// Deletes documents and acknowledges each with `{_type, _id}`, plus
    /// `_missed: true` for tolerated missing documents.
    fn delete(&self, refs: &[DocumentRef], options: &DeleteOptions) -> StoreResult<Vec<Document>>;

    fn find(&self, query: &Query, options: &FindOptions) -> StoreResult<Vec<Document>>;
}
