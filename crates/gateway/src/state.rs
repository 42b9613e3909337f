use parlor_auth::Authenticator;
use parlor_hub::{ChatStores, Hub, RoomId, User, UserId};

use crate::ApiError;

#[derive(Clone)]
pub struct AppState {
    hub: Hub,
    authenticator: Authenticator,
    stores: ChatStores,
}

impl AppState {
    pub fn new(hub: Hub, authenticator: Authenticator, stores: ChatStores) -> Self {
        Self {
            hub,
            authenticator,
            stores,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn stores(&self) -> &ChatStores {
        &self.stores
    }

    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        self.authenticator
            .authenticate(token)
            .await
            .map_err(ApiError::from)
    }

    /// Fails with 404 for unknown rooms and 403 when `user_id` is not a member.
    pub async fn require_member(&self, user_id: UserId, room_id: RoomId) -> Result<(), ApiError> {
        self.stores.rooms.find_room(room_id).await?;
        if self.stores.memberships.is_member(user_id, room_id).await? {
            Ok(())
        } else {
            Err(ApiError::forbidden("not a member of this room"))
        }
    }
}
