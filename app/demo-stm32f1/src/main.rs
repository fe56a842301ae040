// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Blink demo for STM32F103 ("Blue Pill") boards.
//!
//! The full wiring contract, end to end: the SysTick ISR plays message
//! producer -- each tick it allocates a slot from the pool, stamps the LED
//! state into it, and pushes it -- and a single actor on a repurposed
//! interrupt vector receives the messages and drives PC13. The actor's ISR
//! body is exactly one `schedule` call; everything else is data flow.
//!
//! Vector 20 (`USB_LP_CAN_RX0`) is used as the actor's vector because this
//! board's USB cell is otherwise unused; any vector whose peripheral you
//! aren't using works the same way.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod demo {
    use claim_cell::ClaimCell;
    use core::convert::Infallible;
    use cortex_m::peripheral::syst::SystClkSource;
    use cortex_m_rt::{entry, exception};
    use osmium::{sched, Actor, InterruptNum, Message, Pool, Queue};
    use stm32f1::stm32f103 as device;
    use stm32f1::stm32f103::interrupt;

    /// The actor's vector: NVIC position 20.
    const BLINK_VECTOR: InterruptNum = InterruptNum(20);

    pub struct LedCommand {
        pub lit: bool,
    }

    const SLOT: Message<LedCommand> = Message::new(LedCommand { lit: false });
    static SLAB: ClaimCell<[Message<LedCommand>; 4]> = ClaimCell::new([SLOT; 4]);
    static POOL: Pool<LedCommand> = Pool::new();
    static LED_COMMANDS: Queue<LedCommand> = Queue::new();
    static BLINKER: Actor = Actor::new(BLINK_VECTOR);

    async fn blinker_body() -> Infallible {
        // Safety: PC13 belongs to this actor alone once init is done.
        let gpioc = unsafe { &*device::GPIOC::ptr() };
        loop {
            let cmd = BLINKER.recv(&LED_COMMANDS).await;
            // The LED sits between PC13 and 3V3: drive low to light it.
            if cmd.lit {
                gpioc.bsrr.write(|w| w.br13().set_bit());
            } else {
                gpioc.bsrr.write(|w| w.bs13().set_bit());
            }
        }
    }

    /// The actor's ISR. Installing this is step (c) of the wiring contract.
    #[interrupt]
    fn USB_LP_CAN_RX0() {
        sched::schedule(BLINK_VECTOR);
    }

    /// Message producer: one LED command per tick. If the pool ever runs
    /// dry (it won't, at one in flight), the tick is simply skipped.
    #[exception]
    fn SysTick() {
        static mut TICK_COUNT: u32 = 0;
        *TICK_COUNT = TICK_COUNT.wrapping_add(1);

        if let Some(mut cmd) = POOL.alloc() {
            cmd.lit = *TICK_COUNT & 1 != 0;
            LED_COMMANDS.push(cmd);
        }
    }

    /// HSE 8 MHz -> PLL x9 -> 72 MHz sysclk, with the flash wait states
    /// that speed requires.
    fn clock_init(p: &device::Peripherals) {
        let rcc = &p.RCC;

        rcc.cr.modify(|_, w| w.hseon().set_bit());
        while rcc.cr.read().hserdy().bit_is_clear() {}

        p.FLASH.acr.modify(|_, w| {
            w.prftbe().set_bit();
            unsafe { w.latency().bits(0b010) }
        });

        rcc.cfgr.modify(|_, w| {
            w.pllsrc().set_bit();
            unsafe { w.pllmul().bits(0b0111) }
        });
        rcc.cr.modify(|_, w| w.pllon().set_bit());
        while rcc.cr.read().pllrdy().bit_is_clear() {}

        rcc.cfgr.modify(|_, w| unsafe { w.sw().bits(0b10) });
        while rcc.cfgr.read().sws().bits() != 0b10 {}
    }

    fn led_init(p: &device::Peripherals) {
        p.RCC.apb2enr.modify(|_, w| w.iopcen().set_bit());
        // PC13 open-drain output, 2 MHz: CNF = 01, MODE = 10.
        p.GPIOC
            .crh
            .modify(|_, w| unsafe { w.cnf13().bits(0b01).mode13().bits(0b10) });
        p.GPIOC.bsrr.write(|w| w.bs13().set_bit());
    }

    #[entry]
    fn main() -> ! {
        let p = device::Peripherals::take().unwrap();
        let mut core = cortex_m::Peripherals::take().unwrap();

        clock_init(&p);
        led_init(&p);

        // Wire the actor while interrupts are still off. The priority must
        // be programmed before `start`, which reads it back from the NVIC.
        unsafe {
            core.NVIC
                .set_priority(device::Interrupt::USB_LP_CAN_RX0, 0);
            cortex_m::peripheral::NVIC::unmask(device::Interrupt::USB_LP_CAN_RX0);
        }
        POOL.attach(SLAB.claim());
        BLINKER.start(blinker_body());

        // 100 ms tick.
        core.SYST.set_clock_source(SystClkSource::Core);
        core.SYST.set_reload(72_000 * 100 - 1);
        core.SYST.clear_current();
        core.SYST.enable_interrupt();
        core.SYST.enable_counter();

        loop {
            cortex_m::asm::wfi();
        }
    }
}

// Keep host builds (and `cargo test` over the workspace) trivially happy;
// the demo only means something on the target.
#[cfg(not(target_os = "none"))]
fn main() {}
