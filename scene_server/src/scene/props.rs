//! Built-in prop types.

use scene_shared::net::{ActionCode, ActionStatus};
use scene_shared::prop::{
    Collidable, Controlled, Drawable, Positioned, Prop, PropBehavior, PropCaps, TickCtx,
};

use super::registry::SpawnCtx;

const PLAYER_SPEED: f32 = 8.0;

/// Movement driven by held inputs, blocked by solid stage cells.
#[derive(Default)]
struct PlayerBehavior {
    vel_x: f32,
    vel_y: f32,
}

impl PropBehavior for PlayerBehavior {
    fn on_tick(&mut self, caps: &mut PropCaps, ctx: &TickCtx) {
        if self.vel_x == 0.0 && self.vel_y == 0.0 {
            return;
        }
        let Some(pos) = caps.positioned.as_mut() else {
            return;
        };
        let next_x = pos.pos_x + self.vel_x;
        let next_y = pos.pos_y + self.vel_y;
        if !ctx.stage.solidity_at(next_x, next_y).solid {
            pos.pos_x = next_x;
            pos.pos_y = next_y;
        }
    }

    fn on_receive(&mut self, _caps: &mut PropCaps, code: ActionCode, status: ActionStatus) {
        let held = status == ActionStatus::Pressed;
        match code {
            ActionCode::Left => self.vel_x = if held { -PLAYER_SPEED } else { 0.0 },
            ActionCode::Right => self.vel_x = if held { PLAYER_SPEED } else { 0.0 },
            ActionCode::Jump => self.vel_y = if held { -PLAYER_SPEED } else { 0.0 },
            ActionCode::Duck => self.vel_y = if held { PLAYER_SPEED } else { 0.0 },
            ActionCode::Fire => {}
        }
    }
}

/// The prop spawned for a connecting client.
pub fn player(ctx: &SpawnCtx) -> Prop {
    let caps = PropCaps {
        positioned: Some(Positioned::default()),
        drawable: Some(Drawable {
            animation_code: "playerIdle".into(),
        }),
        collidable: Some(Collidable {
            offset_x: 0.0,
            offset_y: 0.0,
            size_x: 32.0,
            size_y: 32.0,
        }),
        controlled: ctx.owner.map(|client_id| Controlled { client_id }),
        name_tagged: None,
    };
    Prop::with_behavior(caps, PlayerBehavior::default())
}

/// A static obstacle.
pub fn crate_block(_ctx: &SpawnCtx) -> Prop {
    Prop::new(PropCaps {
        positioned: Some(Positioned::default()),
        drawable: Some(Drawable {
            animation_code: "crate".into(),
        }),
        collidable: Some(Collidable {
            offset_x: 0.0,
            offset_y: 0.0,
            size_x: 32.0,
            size_y: 32.0,
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_shared::stage::Stage;

    #[test]
    fn player_moves_while_input_held() {
        let stage = Stage::empty();
        let ctx = SpawnCtx { owner: None };
        let mut prop = player(&ctx);
        let mut behavior = prop.behavior.take().unwrap();

        let tick_ctx = TickCtx {
            tick: 0,
            stage: &stage,
        };
        behavior.on_receive(&mut prop.caps, ActionCode::Right, ActionStatus::Pressed);
        behavior.on_tick(&mut prop.caps, &tick_ctx);
        assert_eq!(prop.caps.positioned.unwrap().pos_x, PLAYER_SPEED);

        behavior.on_receive(&mut prop.caps, ActionCode::Right, ActionStatus::Released);
        behavior.on_tick(&mut prop.caps, &tick_ctx);
        assert_eq!(prop.caps.positioned.unwrap().pos_x, PLAYER_SPEED);
    }

    #[test]
    fn player_blocked_by_solid_cell() {
        // open cell at the origin, wall in the next cell to the right
        let stage = Stage::new("wall", 8, " #\n");
        let mut prop = player(&SpawnCtx { owner: None });
        let mut behavior = prop.behavior.take().unwrap();

        behavior.on_receive(&mut prop.caps, ActionCode::Right, ActionStatus::Pressed);
        behavior.on_tick(
            &mut prop.caps,
            &TickCtx {
                tick: 0,
                stage: &stage,
            },
        );
        assert_eq!(prop.caps.positioned.unwrap().pos_x, 0.0);
    }
}
