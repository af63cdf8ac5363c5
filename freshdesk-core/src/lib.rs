mod client;

pub use client::{
    ApiErrorClass, ArticlePayload, Collection, FreshdeskClient, FreshdeskError, Listing, NewEntry,
    Visibility,
};
