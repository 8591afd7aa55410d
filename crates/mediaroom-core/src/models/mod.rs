pub mod media;
pub mod notification;
pub mod pagination;
pub mod relation;

pub use media::{MediaAsset, MediaQuery, MediaStats, NewMediaAsset, Variant, VariantKind};
pub use notification::{NewNotification, Notification, NotificationStatus, MEDIA_UPLOADED_EVENT};
pub use pagination::{MediaResponse, PaginatedMedia, Pagination};
pub use relation::{
    validate_scope, LinkedMedia, MediaRelation, NewMediaRelation, RELATION_FEATURED,
    RELATION_GALLERY,
};
