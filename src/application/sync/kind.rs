use crate::application::ports::Row;
use crate::domain::entities::{Profile, SyncPayload, SyncedItem};
use crate::shared::error::AppError;
use std::fmt;

/// Binds a payload type to its backend table.
pub trait ResourceKind: Send + Sync + 'static {
    type Payload: SyncPayload;
    type Patch: Clone + fmt::Debug + Send + Sync;

    const TABLE: &'static str;
    /// Column holding the parent key (post id, conversation id, user id).
    const SCOPE_COLUMN: &'static str;
    const ID_COLUMN: &'static str = "id";
    const SELECT: &'static str = "*";
    const ORDER_COLUMN: &'static str = "created_at";

    fn parent_key(payload: &Self::Payload) -> &str;

    fn encode(payload: &Self::Payload) -> Row;

    fn encode_patch(patch: &Self::Patch) -> Row;

    fn decode(row: &Row) -> Result<SyncedItem<Self::Payload>, AppError>;

    /// 送信前のローカル検証。正規化した値を返す。
    fn validate(payload: Self::Payload) -> Result<Self::Payload, AppError> {
        Ok(payload)
    }

    /// Profile id whose data the change feed omits and the UI needs.
    fn author_to_resolve(_payload: &Self::Payload) -> Option<&str> {
        None
    }

    fn attach_author(_payload: &mut Self::Payload, _profile: Profile) {}
}
