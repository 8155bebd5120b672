use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use together_core::filter::WishScope;
use together_core::model::{GroupId, UserId};
use together_core::store::{ChangeEvent, Subscription, WishStore};
use together_core::sync::{Applied, LiveWishList};

/// Stable identifier for a simulated device.
pub type DeviceId = usize;

/// One partner's phone: a live list over the shared store, fed by the
/// simulated network instead of reading its subscription directly.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    user: UserId,
    list: Rc<LiveWishList>,
    feed: Subscription<ChangeEvent>,
}

impl Device {
    /// Subscribe to `group` and open a list on `scope`. The list starts
    /// empty; call [`LiveWishList::refresh`] to load it.
    #[must_use]
    pub fn new(
        id: DeviceId,
        user: UserId,
        store: Rc<dyn WishStore>,
        group: &GroupId,
        scope: WishScope,
    ) -> Self {
        let feed = store.subscribe_wishes(group);
        Self {
            id,
            user,
            list: Rc::new(LiveWishList::new(store, scope)),
            feed,
        }
    }

    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn list(&self) -> &LiveWishList {
        &self.list
    }

    /// Everything the store published to this device since the last call,
    /// in publish order.
    pub fn take_published(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.feed.try_recv()).collect()
    }

    /// Hand a relayed event to the list. The returned future owns its
    /// handle on the list, so several deliveries can be in flight at once.
    pub fn deliver(&self, event: ChangeEvent) -> LocalBoxFuture<'static, Applied> {
        let list = Rc::clone(&self.list);
        async move { list.apply_event(event).await }.boxed_local()
    }
}
